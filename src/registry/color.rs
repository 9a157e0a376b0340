//! Color functions
//!
//! Colors travel through expressions as text: `"r,g,b"` from the opaque
//! constructors, `"r,g,b,a"` from everything else. Hex notation (`#rrggbb`,
//! `#aarrggbb`, `#rgb`) is accepted on input.

use super::FunctionRegistry;
use super::builder::FunctionGroup;
use super::function::FunctionContext;
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::register_function;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgba {
    red: f64,
    green: f64,
    blue: f64,
    alpha: f64,
}

/// Hue in `[0, 1)`, everything else in `[0, 1]`
#[derive(Debug, Clone, Copy)]
struct Hsx {
    hue: f64,
    saturation: f64,
    level: f64,
}

fn channel(value: f64) -> i64 {
    (value.clamp(0.0, 1.0) * 255.0).round() as i64
}

impl Rgba {
    fn from_ints(red: i64, green: i64, blue: i64, alpha: i64) -> Option<Self> {
        let valid = |c: i64| (0..=255).contains(&c);
        (valid(red) && valid(green) && valid(blue) && valid(alpha)).then(|| Self {
            red: red as f64 / 255.0,
            green: green as f64 / 255.0,
            blue: blue as f64 / 255.0,
            alpha: alpha as f64 / 255.0,
        })
    }

    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        let parts = text
            .split(',')
            .map(|part| part.trim().parse::<i64>().ok())
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [r, g, b] => Self::from_ints(*r, *g, *b, 255),
            [r, g, b, a] => Self::from_ints(*r, *g, *b, *a),
            _ => None,
        }
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let digits = hex
            .chars()
            .map(|c| c.to_digit(16).map(i64::from))
            .collect::<Option<Vec<_>>>()?;
        let pair = |i: usize| digits[i] * 16 + digits[i + 1];
        match digits.len() {
            3 => Self::from_ints(digits[0] * 17, digits[1] * 17, digits[2] * 17, 255),
            6 => Self::from_ints(pair(0), pair(2), pair(4), 255),
            8 => Self::from_ints(pair(2), pair(4), pair(6), pair(0)),
            _ => None,
        }
    }

    fn ints(&self) -> [i64; 4] {
        [channel(self.red), channel(self.green), channel(self.blue), channel(self.alpha)]
    }

    fn encode_rgb(&self) -> String {
        let [r, g, b, _] = self.ints();
        format!("{r},{g},{b}")
    }

    fn encode(&self) -> String {
        let [r, g, b, a] = self.ints();
        format!("{r},{g},{b},{a}")
    }

    fn max(&self) -> f64 {
        self.red.max(self.green).max(self.blue)
    }

    fn min(&self) -> f64 {
        self.red.min(self.green).min(self.blue)
    }

    fn hue(&self) -> f64 {
        let (max, delta) = (self.max(), self.max() - self.min());
        if delta == 0.0 {
            return 0.0;
        }
        let sector = if max == self.red {
            (self.green - self.blue) / delta
        } else if max == self.green {
            (self.blue - self.red) / delta + 2.0
        } else {
            (self.red - self.green) / delta + 4.0
        };
        (sector / 6.0).rem_euclid(1.0)
    }

    fn to_hsv(self) -> Hsx {
        let max = self.max();
        let saturation = if max == 0.0 { 0.0 } else { (max - self.min()) / max };
        Hsx { hue: self.hue(), saturation, level: max }
    }

    fn to_hsl(self) -> Hsx {
        let (max, min) = (self.max(), self.min());
        let lightness = (max + min) / 2.0;
        let saturation = if max == min {
            0.0
        } else {
            (max - min) / (1.0 - (2.0 * lightness - 1.0).abs())
        };
        Hsx { hue: self.hue(), saturation, level: lightness }
    }

    /// `[cyan, magenta, yellow, black]`
    fn to_cmyk(self) -> [f64; 4] {
        let black = 1.0 - self.max();
        if black >= 1.0 {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let ink = |c: f64| (1.0 - c - black) / (1.0 - black);
        [ink(self.red), ink(self.green), ink(self.blue), black]
    }

    fn from_hsv(hsv: Hsx, alpha: f64) -> Self {
        let Hsx { hue, saturation, level: value } = hsv;
        let sector = hue.rem_euclid(1.0) * 6.0;
        let fraction = sector - sector.floor();
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * fraction);
        let t = value * (1.0 - saturation * (1.0 - fraction));
        let (red, green, blue) = match sector.floor() as i64 {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        };
        Self { red, green, blue, alpha }
    }

    fn from_hsl(hsl: Hsx, alpha: f64) -> Self {
        let Hsx { hue, saturation, level: lightness } = hsl;
        let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let value = lightness + chroma / 2.0;
        let hsv_saturation = if value == 0.0 { 0.0 } else { chroma / value };
        Self::from_hsv(Hsx { hue, saturation: hsv_saturation, level: value }, alpha)
    }

    fn from_cmyk([cyan, magenta, yellow, black]: [f64; 4], alpha: f64) -> Self {
        Self {
            red: (1.0 - cyan) * (1.0 - black),
            green: (1.0 - magenta) * (1.0 - black),
            blue: (1.0 - yellow) * (1.0 - black),
            alpha,
        }
    }

    fn darker(self, factor: i64) -> Self {
        match factor {
            f if f <= 0 => self,
            f if f < 100 => self.lighter(10_000 / f),
            f => {
                let mut hsv = self.to_hsv();
                hsv.level = hsv.level * 100.0 / f as f64;
                Self::from_hsv(hsv, self.alpha)
            }
        }
    }

    fn lighter(self, factor: i64) -> Self {
        match factor {
            f if f <= 0 => self,
            f if f < 100 => self.darker(10_000 / f),
            f => {
                let mut hsv = self.to_hsv();
                hsv.level = hsv.level * f as f64 / 100.0;
                if hsv.level > 1.0 {
                    hsv.saturation = (hsv.saturation - (hsv.level - 1.0)).max(0.0);
                    hsv.level = 1.0;
                }
                Self::from_hsv(hsv, self.alpha)
            }
        }
    }

    fn part(&self, part: &str) -> Option<Value> {
        let percent = |v: f64| Value::Double(v * 100.0);
        let [r, g, b, a] = self.ints();
        let [cyan, magenta, yellow, black] = self.to_cmyk();
        Some(match part.to_ascii_lowercase().as_str() {
            "red" => Value::Int(r),
            "green" => Value::Int(g),
            "blue" => Value::Int(b),
            "alpha" => Value::Int(a),
            "hue" => Value::Double(self.to_hsv().hue * 360.0),
            "saturation" => percent(self.to_hsv().saturation),
            "value" => percent(self.to_hsv().level),
            "hsl_hue" => Value::Double(self.to_hsl().hue * 360.0),
            "hsl_saturation" => percent(self.to_hsl().saturation),
            "lightness" => percent(self.to_hsl().level),
            "cyan" => percent(cyan),
            "magenta" => percent(magenta),
            "yellow" => percent(yellow),
            "black" => percent(black),
            _ => return None,
        })
    }

    fn with_part(self, part: &str, value: i64) -> Option<Self> {
        let fraction = value as f64 / 100.0;
        let byte = (value.clamp(0, 255)) as f64 / 255.0;
        let mut hsv = self.to_hsv();
        let mut hsl = self.to_hsl();
        let mut cmyk = self.to_cmyk();
        Some(match part.to_ascii_lowercase().as_str() {
            "red" => Self { red: byte, ..self },
            "green" => Self { green: byte, ..self },
            "blue" => Self { blue: byte, ..self },
            "alpha" => Self { alpha: byte, ..self },
            "hue" | "saturation" | "value" => {
                match part.to_ascii_lowercase().as_str() {
                    "hue" => hsv.hue = value as f64 / 360.0,
                    "saturation" => hsv.saturation = fraction,
                    _ => hsv.level = fraction,
                }
                Self::from_hsv(hsv, self.alpha)
            }
            "hsl_hue" | "hsl_saturation" | "lightness" => {
                match part.to_ascii_lowercase().as_str() {
                    "hsl_hue" => hsl.hue = value as f64 / 360.0,
                    "hsl_saturation" => hsl.saturation = fraction,
                    _ => hsl.level = fraction,
                }
                Self::from_hsl(hsl, self.alpha)
            }
            "cyan" | "magenta" | "yellow" | "black" => {
                let index = ["cyan", "magenta", "yellow", "black"]
                    .iter()
                    .position(|name| part.eq_ignore_ascii_case(name))?;
                cmyk[index] = fraction;
                Self::from_cmyk(cmyk, self.alpha)
            }
            _ => return None,
        })
    }
}

fn color_arg(call: &FunctionContext<'_>, index: usize) -> EvalResult<Rgba> {
    let text = call.text(index);
    Rgba::parse(&text).ok_or_else(|| EvalError::new(format!("Cannot convert '{text}' to color")))
}

/// Integer arguments `0..count` as fractions of `scales`
fn scaled_args<const N: usize>(
    call: &FunctionContext<'_>,
    scales: [f64; N],
) -> EvalResult<[f64; N]> {
    let mut values = [0.0; N];
    for (index, scale) in scales.iter().enumerate() {
        values[index] = call.int(index)? as f64 / scale;
    }
    Ok(values)
}

fn in_unit_range(values: &[f64]) -> bool {
    values.iter().all(|v| (0.0..=1.0).contains(v))
}

fn invalid_color(values: &[f64]) -> EvalError {
    let joined: Vec<String> = values.iter().map(|v| crate::core::format_double(*v)).collect();
    EvalError::new(format!("Cannot convert '{}' to color", joined.join(":")))
}

impl FunctionRegistry {
    pub fn register_color_functions(&self) -> Result<()> {
        self.register_color_constructors()?;
        register_function!(
            self,
            "color_part",
            groups: [FunctionGroup::Color],
            help: "Returns a specific component of a color, for instance its red or hue component.",
            parameters: ["color", "component"],
            implementation: |call| {
                let color = color_arg(call, 0)?;
                let part = call.text(1);
                color
                    .part(&part)
                    .ok_or_else(|| EvalError::new(format!("Unknown color component '{part}'")))
            }
        )?;
        register_function!(
            self,
            "set_color_part",
            groups: [FunctionGroup::Color],
            help: "Sets a specific component of a color.",
            parameters: ["color", "component", "value"],
            implementation: |call| {
                let color = color_arg(call, 0)?;
                let part = call.text(1);
                color
                    .with_part(&part, call.int(2)?)
                    .map(|c| Value::String(c.encode()))
                    .ok_or_else(|| EvalError::new(format!("Unknown color component '{part}'")))
            }
        )?;
        register_function!(
            self,
            "darker",
            groups: [FunctionGroup::Color],
            help: "Returns a darker color; a factor of 200 halves the brightness.",
            parameters: ["color", "factor"],
            implementation: |call| {
                Ok(Value::String(color_arg(call, 0)?.darker(call.int(1)?).encode()))
            }
        )?;
        register_function!(
            self,
            "lighter",
            groups: [FunctionGroup::Color],
            help: "Returns a lighter color; a factor of 150 makes it 50% brighter.",
            parameters: ["color", "factor"],
            implementation: |call| {
                Ok(Value::String(color_arg(call, 0)?.lighter(call.int(1)?).encode()))
            }
        )
    }

    fn register_color_constructors(&self) -> Result<()> {
        register_function!(
            self,
            "color_rgb",
            groups: [FunctionGroup::Color],
            help: "Returns a color from its red, green and blue components.",
            arity: 3,
            implementation: |call| {
                let (r, g, b) = (call.int(0)?, call.int(1)?, call.int(2)?);
                Rgba::from_ints(r, g, b, 255)
                    .map(|c| Value::String(c.encode_rgb()))
                    .ok_or_else(|| EvalError::new(format!("Cannot convert '{r}:{g}:{b}' to color")))
            }
        )?;
        register_function!(
            self,
            "color_rgba",
            groups: [FunctionGroup::Color],
            help: "Returns a color from its red, green, blue and alpha components.",
            arity: 4,
            implementation: |call| {
                let (r, g, b, a) = (call.int(0)?, call.int(1)?, call.int(2)?, call.int(3)?);
                Rgba::from_ints(r, g, b, a)
                    .map(|c| Value::String(c.encode()))
                    .ok_or_else(|| {
                        EvalError::new(format!("Cannot convert '{r}:{g}:{b}:{a}' to color"))
                    })
            }
        )?;
        register_function!(
            self,
            "color_hsl",
            groups: [FunctionGroup::Color],
            help: "Returns a color from hue (0-360), saturation and lightness (0-100).",
            arity: 3,
            implementation: |call| {
                let [h, s, l] = scaled_args(call, [360.0, 100.0, 100.0])?;
                if !in_unit_range(&[s, l]) {
                    return Err(invalid_color(&[h, s, l]));
                }
                let hsl = Hsx { hue: h, saturation: s, level: l };
                Ok(Value::String(Rgba::from_hsl(hsl, 1.0).encode_rgb()))
            }
        )?;
        register_function!(
            self,
            "color_hsla",
            groups: [FunctionGroup::Color],
            help: "Returns a color from hue (0-360), saturation, lightness (0-100) and alpha (0-255).",
            arity: 4,
            implementation: |call| {
                let [h, s, l, a] = scaled_args(call, [360.0, 100.0, 100.0, 255.0])?;
                if !in_unit_range(&[s, l, a]) {
                    return Err(invalid_color(&[h, s, l, a]));
                }
                let hsl = Hsx { hue: h, saturation: s, level: l };
                Ok(Value::String(Rgba::from_hsl(hsl, a).encode()))
            }
        )?;
        register_function!(
            self,
            "color_hsv",
            groups: [FunctionGroup::Color],
            help: "Returns a color from hue (0-360), saturation and value (0-100).",
            arity: 3,
            implementation: |call| {
                let [h, s, v] = scaled_args(call, [360.0, 100.0, 100.0])?;
                if !in_unit_range(&[s, v]) {
                    return Err(invalid_color(&[h, s, v]));
                }
                let hsv = Hsx { hue: h, saturation: s, level: v };
                Ok(Value::String(Rgba::from_hsv(hsv, 1.0).encode_rgb()))
            }
        )?;
        register_function!(
            self,
            "color_hsva",
            groups: [FunctionGroup::Color],
            help: "Returns a color from hue (0-360), saturation, value (0-100) and alpha (0-255).",
            arity: 4,
            implementation: |call| {
                let [h, s, v, a] = scaled_args(call, [360.0, 100.0, 100.0, 255.0])?;
                if !in_unit_range(&[s, v, a]) {
                    return Err(invalid_color(&[h, s, v, a]));
                }
                let hsv = Hsx { hue: h, saturation: s, level: v };
                Ok(Value::String(Rgba::from_hsv(hsv, a).encode()))
            }
        )?;
        register_function!(
            self,
            "color_cmyk",
            groups: [FunctionGroup::Color],
            help: "Returns a color from its cyan, magenta, yellow and black components (0-100).",
            arity: 4,
            implementation: |call| {
                let cmyk = scaled_args(call, [100.0; 4])?;
                if !in_unit_range(&cmyk) {
                    return Err(invalid_color(&cmyk));
                }
                Ok(Value::String(Rgba::from_cmyk(cmyk, 1.0).encode_rgb()))
            }
        )?;
        register_function!(
            self,
            "color_cmyka",
            groups: [FunctionGroup::Color],
            help: "Returns a color from cyan, magenta, yellow, black (0-100) and alpha (0-255).",
            arity: 5,
            implementation: |call| {
                let [c, m, y, k, a] = scaled_args(call, [100.0, 100.0, 100.0, 100.0, 255.0])?;
                if !in_unit_range(&[c, m, y, k, a]) {
                    return Err(invalid_color(&[c, m, y, k, a]));
                }
                Ok(Value::String(Rgba::from_cmyk([c, m, y, k], a).encode()))
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::evaluator::{EvaluationContext, Expression};

    fn eval(text: &str) -> (Value, String) {
        let mut expression = Expression::new(text);
        let value = expression.evaluate(&mut EvaluationContext::new());
        (value, expression.eval_error_string())
    }

    #[rstest]
    #[case("color_rgb(255, 127, 0)", "255,127,0")]
    #[case("color_rgba(255, 127, 0, 200)", "255,127,0,200")]
    #[case("color_hsv(0, 100, 100)", "255,0,0")]
    #[case("color_hsl(120, 100, 50)", "0,255,0")]
    #[case("color_hsla(240, 100, 50, 255)", "0,0,255,255")]
    #[case("color_hsva(0, 0, 0, 128)", "0,0,0,128")]
    #[case("color_cmyk(0, 100, 100, 0)", "255,0,0")]
    #[case("color_cmyka(100, 0, 0, 0, 255)", "0,255,255,255")]
    #[case("darker('200,100,50,255', 200)", "100,50,25,255")]
    #[case("lighter('100,50,25,255', 200)", "200,100,50,255")]
    #[case("set_color_part('200,0,0,255', 'alpha', 10)", "200,0,0,10")]
    #[case("set_color_part('#ff0000', 'green', 255)", "255,255,0,255")]
    #[case("set_color_part('255,0,0', 'value', 0)", "0,0,0,255")]
    fn test_color_strings(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(eval(text), (Value::from(expected), String::new()));
    }

    #[rstest]
    #[case("color_part('200,10,30,40', 'red')", Value::Int(200))]
    #[case("color_part('200,10,30,40', 'ALPHA')", Value::Int(40))]
    #[case("color_part('255,0,0', 'hue')", Value::Double(0.0))]
    #[case("color_part('0,0,255', 'hue')", Value::Double(240.0))]
    #[case("color_part('255,0,0', 'saturation')", Value::Double(100.0))]
    #[case("color_part('0,0,0', 'black')", Value::Double(100.0))]
    #[case("color_part('#00ff00', 'green')", Value::Int(255))]
    fn test_color_part(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(eval(text), (expected, String::new()));
    }

    #[rstest]
    #[case("color_rgb(300, 0, 0)", "Cannot convert '300:0:0' to color")]
    #[case("color_part('not a color', 'red')", "Cannot convert 'not a color' to color")]
    #[case("color_part('1,2,3', 'shine')", "Unknown color component 'shine'")]
    #[case("set_color_part('1,2,3', 'shine', 4)", "Unknown color component 'shine'")]
    fn test_color_errors(#[case] text: &str, #[case] message: &str) {
        assert_eq!(eval(text), (Value::Null, message.to_string()));
    }

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Rgba::parse("#f00").map(|c| c.encode()), Some("255,0,0,255".into()));
        assert_eq!(Rgba::parse("#80ff0000").map(|c| c.encode()), Some("255,0,0,128".into()));
        assert_eq!(Rgba::parse("#12345"), None);
    }
}
