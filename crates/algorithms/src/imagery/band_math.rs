//! Band math: arithmetic expressions over the bands of a pixel.
//!
//! Each expression yields one output band. Variables are `b1..bN`
//! (1-based over the concatenated input stack) or user-chosen names bound
//! to zero-based band indices.
//!
//! Example expressions:
//! - `"(b4 - b3) / (b4 + b3)"` → NDVI on a 4-band stack
//! - `"2.5 * (nir - red) / (nir + 6 * red - 7.5 * blue + 1)"` → EVI with named bands
//! - `"b1 ^ 2 + -b2"`

use imgcalc_core::{Error, MemRaster, RasterSource, Result};
use imgcalc_engine::{ImageCalc, NoDataPolicy, PixelCalculator};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

/// Compiled expression; variables are resolved to band indices
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Band(usize),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
}

fn syntax_error(expression: &str, reason: impl Into<String>) -> Error {
    Error::invalid_param("expression", expression, reason)
}

fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| syntax_error(formula, format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => {
                return Err(syntax_error(formula, format!("unexpected character '{}'", c)));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser.
///
/// ```text
/// expr   = term (('+' | '-') term)*
/// term   = unary (('*' | '/') unary)*
/// unary  = ('-' | '+') unary | power
/// power  = atom ('^' unary)?          right associative
/// atom   = number | ident | '(' expr ')'
/// ```
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    variables: &'a [(String, usize)],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        if let Some(t) = self.peek() {
            return Err(syntax_error(self.source, format!("unexpected trailing token {:?}", t)));
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op('+')) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expr::BinOp {
                op: '^',
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => self.resolve(&name).map(Expr::Band),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(syntax_error(self.source, "expected closing parenthesis")),
                }
            }
            other => Err(syntax_error(self.source, format!("unexpected token {:?}", other))),
        }
    }

    /// Named variables first, then `b<n>` (1-based)
    fn resolve(&self, name: &str) -> Result<usize> {
        if let Some((_, band)) = self.variables.iter().find(|(n, _)| n == name) {
            return Ok(*band);
        }
        if let Some(digits) = name.strip_prefix('b').or_else(|| name.strip_prefix('B'))
            && let Ok(n) = digits.parse::<usize>()
            && n >= 1
        {
            return Ok(n - 1);
        }
        Err(syntax_error(self.source, format!("unknown variable '{}'", name)))
    }
}

fn eval(expr: &Expr, sample: &[f64]) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Band(b) => sample[*b],
        Expr::BinOp { op, left, right } => {
            let l = eval(left, sample);
            let r = eval(right, sample);
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r == 0.0 {
                        f64::NAN
                    } else {
                        l / r
                    }
                }
                '^' => l.powf(r),
                _ => f64::NAN,
            }
        }
        Expr::Neg(inner) => -eval(inner, sample),
    }
}

fn max_band(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Band(b) => Some(*b),
        Expr::BinOp { left, right, .. } => max_band(left).max(max_band(right)),
        Expr::Neg(inner) => max_band(inner),
        Expr::Num(_) => None,
    }
}

/// Parameters for band math
#[derive(Debug, Clone, Default)]
pub struct BandMathParams {
    /// One expression per output band
    pub expressions: Vec<String>,
    /// Named variables bound to zero-based band indices
    pub variables: Vec<(String, usize)>,
    pub nodata: Option<f64>,
}

/// Expression calculator
#[derive(Debug, Clone)]
pub struct BandMath {
    exprs: Vec<Expr>,
    nodata: NoDataPolicy,
}

impl BandMath {
    pub fn new(params: &BandMathParams) -> Result<Self> {
        if params.expressions.is_empty() {
            return Err(Error::invalid_param("expressions", 0, "at least one expression is required"));
        }
        let exprs = params
            .expressions
            .iter()
            .map(|source| {
                let tokens = tokenize(source)?;
                Parser {
                    source,
                    tokens,
                    pos: 0,
                    variables: &params.variables,
                }
                .parse()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            exprs,
            nodata: NoDataPolicy::from_option(params.nodata),
        })
    }

    /// Evaluate every expression for one sample
    pub fn evaluate(&self, sample: &[f64]) -> Vec<f64> {
        self.exprs.iter().map(|e| eval(e, sample)).collect()
    }
}

impl PixelCalculator for BandMath {
    fn num_out_bands(&self) -> usize {
        self.exprs.len()
    }

    fn nodata(&self) -> NoDataPolicy {
        self.nodata
    }

    fn check_bands(&self, num_bands: usize) -> Result<()> {
        if let Some(max) = self.exprs.iter().filter_map(max_band).max() {
            imgcalc_engine::check_band(max, num_bands)?;
        }
        Ok(())
    }

    fn calc_pixel(&mut self, sample: &[f64], out: &mut [f64]) -> Result<()> {
        for (o, expr) in out.iter_mut().zip(&self.exprs) {
            *o = eval(expr, sample);
        }
        Ok(())
    }
}

/// Evaluate band math over a stack of co-registered inputs
pub fn band_math(inputs: &[&dyn RasterSource], params: &BandMathParams) -> Result<MemRaster> {
    let mut calc = BandMath::new(params)?;
    ImageCalc::default().calc_image_to_memory(inputs, &mut calc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(expr: &str) -> BandMath {
        BandMath::new(&BandMathParams {
            expressions: vec![expr.to_string()],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_precedence_and_power() {
        let calc = compile("b1 + b2 * 2 ^ 2");
        assert!((calc.evaluate(&[1.0, 3.0])[0] - 13.0).abs() < 1e-10);
        // right associative
        let calc = compile("2 ^ 3 ^ 2");
        assert!((calc.evaluate(&[])[0] - 512.0).abs() < 1e-10);
        // unary minus binds looser than ^
        let calc = compile("-b1 ^ 2");
        assert!((calc.evaluate(&[3.0])[0] + 9.0).abs() < 1e-10);
    }

    #[test]
    fn test_ndvi_formula() {
        let calc = compile("(b2 - b1) / (b2 + b1)");
        let v = calc.evaluate(&[0.1, 0.5])[0];
        assert!((v - 0.4 / 0.6).abs() < 1e-10);
    }

    #[test]
    fn test_named_variables() {
        let calc = BandMath::new(&BandMathParams {
            expressions: vec!["nir - red".into(), "red * 10".into()],
            variables: vec![("red".into(), 0), ("nir".into(), 2)],
            nodata: None,
        })
        .unwrap();
        assert_eq!(calc.num_out_bands(), 2);
        assert_eq!(calc.evaluate(&[1.0, 0.0, 4.0]), vec![3.0, 10.0]);
    }

    #[test]
    fn test_division_by_zero_is_nan() {
        assert!(compile("b1 / 0").evaluate(&[1.0])[0].is_nan());
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["b1 +", "(b1", "b1 $ 2", "foo", "b0", "b1 b2"] {
            assert!(
                BandMath::new(&BandMathParams {
                    expressions: vec![bad.into()],
                    ..Default::default()
                })
                .is_err(),
                "expected error for {}",
                bad
            );
        }
    }

    #[test]
    fn test_band_out_of_range() {
        let calc = compile("b3 + 1");
        assert!(matches!(
            calc.check_bands(2),
            Err(Error::BandIndex { index: 2, available: 2 })
        ));
        assert!(calc.check_bands(3).is_ok());
    }

    #[test]
    fn test_band_math_over_stack() {
        let a = MemRaster::filled(1, 3, 3, 2.0);
        let b = MemRaster::filled(1, 3, 3, 5.0);
        let params = BandMathParams {
            expressions: vec!["b1 * b2".into()],
            ..Default::default()
        };
        let out = band_math(&[&a, &b], &params).unwrap();
        assert!(out.data().iter().all(|&v| (v - 10.0).abs() < 1e-10));
    }
}
