#![forbid(unsafe_code)]

//! Control values.
//!
//! [`ControlValue`] is the closed set of values a control can hold. Buttons
//! and folders hold none, so they have no variant here.

use std::fmt;

use xrtune_core::glam::Vec3;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha, 255 is opaque.
    pub a: u8,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    /// Opaque color from components.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Color from components including alpha.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rgba`, `#rrggbb`, or `#rrggbbaa` (case-insensitive).
    #[must_use]
    pub fn parse_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&digits[i..=i], 16).ok();
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        match digits.len() {
            3 | 4 => {
                let expand = |n: u8| n * 17;
                let a = if digits.len() == 4 { expand(nibble(3)?) } else { 255 };
                Some(Self::rgba(
                    expand(nibble(0)?),
                    expand(nibble(1)?),
                    expand(nibble(2)?),
                    a,
                ))
            }
            6 | 8 => {
                let a = if digits.len() == 8 { byte(6)? } else { 255 };
                Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, a))
            }
            _ => None,
        }
    }

    /// Whether `text` matches the hex color pattern.
    #[must_use]
    pub fn is_hex(text: &str) -> bool {
        Self::parse_hex(text).is_some()
    }

    /// Lowercase `#rrggbb`, or `#rrggbbaa` when not opaque.
    #[must_use]
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// ControlValue
// ---------------------------------------------------------------------------

/// Current value of a leaf control.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    /// Numeric slider or field.
    Number(f64),
    /// Toggle.
    Bool(bool),
    /// Free text.
    String(String),
    /// Color swatch.
    Color(Color),
    /// 3D vector.
    Vector3(Vec3),
}

impl ControlValue {
    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::String(_) => "string",
            Self::Color(_) => "color",
            Self::Vector3(_) => "vector3",
        }
    }

    /// The number, if this is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The text, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The color, if this is one.
    #[must_use]
    pub const fn as_color(&self) -> Option<Color> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// The vector, if this is one.
    #[must_use]
    pub const fn as_vector3(&self) -> Option<Vec3> {
        match self {
            Self::Vector3(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
            Self::Color(c) => write!(f, "{c}"),
            Self::Vector3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
        }
    }
}

impl From<f64> for ControlValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for ControlValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i32> for ControlValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for ControlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ControlValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Color> for ControlValue {
    fn from(value: Color) -> Self {
        Self::Color(value)
    }
}

impl From<Vec3> for ControlValue {
    fn from(value: Vec3) -> Self {
        Self::Vector3(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_and_short_hex() {
        assert_eq!(Color::parse_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(Color::parse_hex("#F80"), Some(Color::rgb(255, 136, 0)));
        assert_eq!(
            Color::parse_hex("#ff800080"),
            Some(Color::rgba(255, 128, 0, 128))
        );
        assert_eq!(Color::parse_hex("#f808"), Some(Color::rgba(255, 136, 0, 136)));
    }

    #[test]
    fn reject_non_hex() {
        assert_eq!(Color::parse_hex("ff8000"), None);
        assert_eq!(Color::parse_hex("#ggg"), None);
        assert_eq!(Color::parse_hex("#12345"), None);
        assert_eq!(Color::parse_hex("#"), None);
        assert!(!Color::is_hex("red"));
    }

    #[test]
    fn hex_output_is_lowercase() {
        assert_eq!(Color::rgb(171, 205, 239).to_hex(), "#abcdef");
        assert_eq!(Color::rgba(1, 2, 3, 4).to_hex(), "#01020304");
    }

    #[test]
    fn value_accessors() {
        assert_eq!(ControlValue::from(2).as_number(), Some(2.0));
        assert_eq!(ControlValue::from(true).as_bool(), Some(true));
        assert_eq!(ControlValue::from("x").as_str(), Some("x"));
        assert_eq!(ControlValue::from(Vec3::ONE).as_vector3(), Some(Vec3::ONE));
        assert_eq!(ControlValue::from(true).as_number(), None);
        assert_eq!(ControlValue::from(1.5).type_name(), "number");
    }

    #[test]
    fn display_formats() {
        assert_eq!(ControlValue::from(Color::rgb(255, 0, 0)).to_string(), "#ff0000");
        assert_eq!(ControlValue::from(1.5).to_string(), "1.5");
    }
}
