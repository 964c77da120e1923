//! Native GeoTIFF reading/writing on top of the `tiff` crate.
//!
//! Multi-band rasters are stored as multi-page files, one single-sample page
//! per band. Georeferencing uses ModelPixelScale + ModelTiepoint, the no-data
//! value uses the GDAL_NODATA ASCII tag and band names go into
//! ImageDescription.

use crate::error::{Error, Result};
use crate::io::{OutputSpec, RasterSink, RasterSource};
use crate::raster::{DataType, GeoTransform, MemRaster, RasterBlock, RasterElement, convert_samples};
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    ColorType, Gray8, Gray16, Gray32, Gray32Float, Gray64Float, GrayI16, GrayI32,
};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

/// Read a GeoTIFF file into a [`MemRaster`], one band per page
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<MemRaster> {
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<MemRaster> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<MemRaster> {
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;

    let mut bands: Vec<Array2<f64>> = Vec::new();
    let mut names = Vec::new();
    let mut transform = None;
    let mut nodata = None;

    loop {
        let (width, height) = decoder
            .dimensions()
            .map_err(tiff_err("Cannot read dimensions"))?;
        let (rows, cols) = (height as usize, width as usize);

        let values = decoding_to_f64(
            decoder
                .read_image()
                .map_err(tiff_err("Cannot read image data"))?,
        )?;
        if values.len() != rows * cols {
            // interleaved multi-sample pages are not produced by this driver
            return Err(Error::UnsupportedDataType(format!(
                "page {} has {} samples for {}x{} pixels",
                bands.len(),
                values.len(),
                rows,
                cols
            )));
        }

        if bands.is_empty() {
            transform = read_geotransform(&mut decoder);
            nodata = read_nodata(&mut decoder);
        }
        names.push(
            decoder
                .get_tag_ascii_string(Tag::ImageDescription)
                .unwrap_or_else(|_| format!("Band {}", bands.len() + 1)),
        );
        bands.push(
            Array2::from_shape_vec((rows, cols), values)
                .map_err(|_| Error::InvalidDimensions { rows, cols })?,
        );

        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(tiff_err("Cannot advance to next page"))?;
    }

    let mut raster = MemRaster::from_bands(&bands)?;
    if let Some(gt) = transform {
        raster.set_transform(gt);
    }
    raster.set_nodata(nodata);
    raster.set_band_names(names);
    tracing::debug!(
        bands = raster.bands(),
        rows = raster.rows(),
        cols = raster.cols(),
        "decoded GeoTIFF"
    );
    Ok(raster)
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    macro_rules! widen {
        ($buf:expr) => {
            $buf.into_iter().map(|v| v as f64).collect()
        };
    }
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(buf) => widen!(buf),
        DecodingResult::U16(buf) => widen!(buf),
        DecodingResult::U32(buf) => widen!(buf),
        DecodingResult::U64(buf) => widen!(buf),
        DecodingResult::I8(buf) => widen!(buf),
        DecodingResult::I16(buf) => widen!(buf),
        DecodingResult::I32(buf) => widen!(buf),
        DecodingResult::I64(buf) => widen!(buf),
        DecodingResult::F32(buf) => widen!(buf),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ));
        }
    };
    Ok(values)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok())
}

/// Write a [`MemRaster`] to a GeoTIFF file, converting samples to `data_type`
pub fn write_geotiff<P: AsRef<Path>>(raster: &MemRaster, path: P, data_type: DataType) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, data_type)
}

fn encode_geotiff<W: Write + Seek>(raster: &MemRaster, writer: W, data_type: DataType) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let nodata = RasterSource::nodata(raster, 0);
    for band in 0..raster.bands() {
        let page = Page {
            data: raster.band(band),
            transform: raster.transform(),
            nodata,
            name: &raster.band_names()[band],
        };
        match data_type {
            DataType::U8 => write_page::<Gray8, W>(&mut encoder, &page)?,
            DataType::U16 => write_page::<Gray16, W>(&mut encoder, &page)?,
            DataType::I16 => write_page::<GrayI16, W>(&mut encoder, &page)?,
            DataType::I32 => write_page::<GrayI32, W>(&mut encoder, &page)?,
            DataType::U32 => write_page::<Gray32, W>(&mut encoder, &page)?,
            DataType::F32 => write_page::<Gray32Float, W>(&mut encoder, &page)?,
            DataType::F64 => write_page::<Gray64Float, W>(&mut encoder, &page)?,
        }
    }
    Ok(())
}

struct Page<'a> {
    data: ArrayView2<'a, f64>,
    transform: GeoTransform,
    nodata: Option<f64>,
    name: &'a str,
}

fn write_page<C, W>(encoder: &mut TiffEncoder<W>, page: &Page<'_>) -> Result<()>
where
    C: ColorType,
    C::Inner: RasterElement,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let (rows, cols) = page.data.dim();
    let samples: Vec<C::Inner> = convert_samples(page.data.iter());

    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = page.transform;
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;
    // GTModelTypeGeoKey=Projected, GTRasterTypeGeoKey=PixelIsArea
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;
    if let Some(nd) = page.nodata {
        let text = format!("{}", nd);
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), text.as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }
    image
        .encoder()
        .write_tag(Tag::ImageDescription, page.name)
        .map_err(tiff_err("Cannot write band name"))?;

    image
        .write_data(&samples)
        .map_err(tiff_err("Cannot write image data"))?;
    Ok(())
}

/// A [`RasterSink`] that collects blocks in memory and writes a GeoTIFF on
/// [`RasterSink::finish`].
///
/// The `tiff` encoder writes pages sequentially, so band `n + 1` cannot
/// start before band `n` is complete; buffering the whole output is the
/// price of producing one multi-band file from a row-major pass.
pub struct TiffSink {
    path: PathBuf,
    data_type: DataType,
    buffer: MemRaster,
    finished: bool,
}

impl TiffSink {
    pub fn create(path: impl AsRef<Path>, spec: &OutputSpec, like: &dyn RasterSource) -> Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            data_type: spec.data_type,
            buffer: spec.create_memory(like)?,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSink for TiffSink {
    fn band_count(&self) -> usize {
        self.buffer.bands()
    }

    fn size(&self) -> (usize, usize) {
        (self.buffer.rows(), self.buffer.cols())
    }

    fn write_block(&mut self, block: &RasterBlock) -> Result<()> {
        RasterSink::write_block(&mut self.buffer, block)
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        write_geotiff(&self.buffer, &self.path, self.data_type)?;
        self.finished = true;
        tracing::debug!(path = %self.path.display(), "wrote GeoTIFF");
        Ok(())
    }
}
