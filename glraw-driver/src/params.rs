//! Conversion options accepted by `glraw-cmd`.
//!
//! Request input is decoded into [`ConversionParams`] with serde; the only
//! ways to obtain a [`ParameterSpec`] (`TryFrom<ConversionParams>` and
//! [`ParameterSpec::builder`]) fill in defaults and validate before handing
//! it out.

use serde::Deserialize;

use crate::error::ValidationError;

/// Enum values are accepted as the short name or the encoder token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum Format {
    #[serde(rename = "RED", alias = "GL_RED")]
    Red,
    #[serde(rename = "GREEN", alias = "GL_GREEN")]
    Green,
    #[serde(rename = "BLUE", alias = "GL_BLUE")]
    Blue,
    #[serde(rename = "RG", alias = "GL_RG")]
    Rg,
    #[serde(rename = "RGB", alias = "GL_RGB")]
    Rgb,
    #[serde(rename = "BGR", alias = "GL_BGR")]
    Bgr,
    #[default]
    #[serde(rename = "RGBA", alias = "GL_RGBA")]
    Rgba,
    #[serde(rename = "BGRA", alias = "GL_BGRA")]
    Bgra,
}

impl Format {
    pub fn token(&self) -> &'static str {
        match self {
            Format::Red => "GL_RED",
            Format::Green => "GL_GREEN",
            Format::Blue => "GL_BLUE",
            Format::Rg => "GL_RG",
            Format::Rgb => "GL_RGB",
            Format::Bgr => "GL_BGR",
            Format::Rgba => "GL_RGBA",
            Format::Bgra => "GL_BGRA",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum PixelType {
    #[default]
    #[serde(rename = "UBYTE", alias = "GL_UNSIGNED_BYTE")]
    UByte,
    #[serde(rename = "BYTE", alias = "GL_BYTE")]
    Byte,
    #[serde(rename = "USHORT", alias = "GL_UNSIGNED_SHORT")]
    UShort,
    #[serde(rename = "SHORT", alias = "GL_SHORT")]
    Short,
    #[serde(rename = "UINT", alias = "GL_UNSIGNED_INT")]
    UInt,
    #[serde(rename = "INT", alias = "GL_INT")]
    Int,
    #[serde(rename = "FLOAT", alias = "GL_FLOAT")]
    Float,
}

impl PixelType {
    pub fn token(&self) -> &'static str {
        match self {
            PixelType::UByte => "GL_UNSIGNED_BYTE",
            PixelType::Byte => "GL_BYTE",
            PixelType::UShort => "GL_UNSIGNED_SHORT",
            PixelType::Short => "GL_SHORT",
            PixelType::UInt => "GL_UNSIGNED_INT",
            PixelType::Int => "GL_INT",
            PixelType::Float => "GL_FLOAT",
        }
    }
}

/// Compressed texture formats understood by the encoder. Not cross-checked
/// against [`Format`] / [`PixelType`]; the encoder decides what wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub enum CompressedFormat {
    #[serde(rename = "COMPRESSED_RED", alias = "GL_COMPRESSED_RED")]
    Red,
    #[serde(rename = "COMPRESSED_RG", alias = "GL_COMPRESSED_RG")]
    Rg,
    #[serde(rename = "COMPRESSED_RGB", alias = "GL_COMPRESSED_RGB")]
    Rgb,
    #[serde(rename = "COMPRESSED_RGBA", alias = "GL_COMPRESSED_RGBA")]
    Rgba,
    #[serde(rename = "COMPRESSED_SRGB", alias = "GL_COMPRESSED_SRGB")]
    Srgb,
    #[serde(rename = "COMPRESSED_SRGB_ALPHA", alias = "GL_COMPRESSED_SRGB_ALPHA")]
    SrgbAlpha,
    #[serde(rename = "COMPRESSED_RED_RGTC1", alias = "GL_COMPRESSED_RED_RGTC1")]
    RedRgtc1,
    #[serde(
        rename = "COMPRESSED_SIGNED_RED_RGTC1",
        alias = "GL_COMPRESSED_SIGNED_RED_RGTC1"
    )]
    SignedRedRgtc1,
    #[serde(rename = "COMPRESSED_RG_RGTC2", alias = "GL_COMPRESSED_RG_RGTC2")]
    RgRgtc2,
    #[serde(
        rename = "COMPRESSED_SIGNED_RG_RGTC2",
        alias = "GL_COMPRESSED_SIGNED_RG_RGTC2"
    )]
    SignedRgRgtc2,
    #[serde(
        rename = "COMPRESSED_RGBA_BPTC_UNORM",
        alias = "GL_COMPRESSED_RGBA_BPTC_UNORM"
    )]
    RgbaBptcUnorm,
}

impl CompressedFormat {
    pub fn token(&self) -> &'static str {
        match self {
            CompressedFormat::Red => "GL_COMPRESSED_RED",
            CompressedFormat::Rg => "GL_COMPRESSED_RG",
            CompressedFormat::Rgb => "GL_COMPRESSED_RGB",
            CompressedFormat::Rgba => "GL_COMPRESSED_RGBA",
            CompressedFormat::Srgb => "GL_COMPRESSED_SRGB",
            CompressedFormat::SrgbAlpha => "GL_COMPRESSED_SRGB_ALPHA",
            CompressedFormat::RedRgtc1 => "GL_COMPRESSED_RED_RGTC1",
            CompressedFormat::SignedRedRgtc1 => "GL_COMPRESSED_SIGNED_RED_RGTC1",
            CompressedFormat::RgRgtc2 => "GL_COMPRESSED_RG_RGTC2",
            CompressedFormat::SignedRgRgtc2 => "GL_COMPRESSED_SIGNED_RG_RGTC2",
            CompressedFormat::RgbaBptcUnorm => "GL_COMPRESSED_RGBA_BPTC_UNORM",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum AspectRatioMode {
    #[default]
    #[serde(alias = "IgnoreAspectRatio")]
    Ignore,
    #[serde(alias = "KeepAspectRatio")]
    Keep,
    #[serde(alias = "KeepAspectRatioByExpanding")]
    KeepByExpanding,
}

impl AspectRatioMode {
    pub fn token(&self) -> &'static str {
        match self {
            AspectRatioMode::Ignore => "IgnoreAspectRatio",
            AspectRatioMode::Keep => "KeepAspectRatio",
            AspectRatioMode::KeepByExpanding => "KeepAspectRatioByExpanding",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    #[default]
    Nearest,
    Linear,
}

impl TransformMode {
    pub fn token(&self) -> &'static str {
        match self {
            TransformMode::Nearest => "nearest",
            TransformMode::Linear => "linear",
        }
    }
}

/// Conversion options as sent by a client (query string or form fields).
/// Absent options stay `None` and take their defaults in [`ParameterSpec`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversionParams {
    pub no_suffixes: Option<bool>,
    pub format: Option<Format>,
    #[serde(rename = "type", alias = "pixel_type")]
    pub pixel_type: Option<PixelType>,
    pub compressed_format: Option<CompressedFormat>,
    pub mirror_vertical: Option<bool>,
    pub mirror_horizontal: Option<bool>,
    pub scale: Option<f64>,
    pub width_scale: Option<f64>,
    pub height_scale: Option<f64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    #[serde(alias = "aspect_ratio")]
    pub aspect_ratio_mode: Option<AspectRatioMode>,
    pub transform_mode: Option<TransformMode>,
}

impl ConversionParams {
    /// Decodes untrusted `(name, value)` pairs. Later pairs override earlier
    /// ones, an empty value unsets the option, unknown names are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut merged: Vec<(&str, &str)> = Vec::new();
        for (key, value) in pairs {
            let value = value.trim();
            merged.retain(|(k, _)| *k != key);
            if !value.is_empty() {
                merged.push((key, value));
            }
        }

        decode(&merged).map_err(|err| {
            // serde_urlencoded errors carry no field path; find the culprit.
            let field = merged
                .iter()
                .find(|pair| decode(std::slice::from_ref(*pair)).is_err())
                .map_or("parameters", |(key, _)| *key);
            ValidationError::new(field, err.to_string())
        })
    }
}

fn decode(pairs: &[(&str, &str)]) -> Result<ConversionParams, serde_urlencoded::de::Error> {
    let encoded = serde_urlencoded::to_string(pairs)
        .map_err(<serde_urlencoded::de::Error as serde::de::Error>::custom)?;
    serde_urlencoded::from_str(&encoded)
}

/// Validated, fully defaulted option set for one conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpec {
    no_suffixes: bool,
    format: Format,
    pixel_type: PixelType,
    compressed_format: Option<CompressedFormat>,
    mirror_vertical: bool,
    mirror_horizontal: bool,
    scale: f64,
    width_scale: f64,
    height_scale: f64,
    width: Option<u32>,
    height: Option<u32>,
    aspect_ratio_mode: AspectRatioMode,
    transform_mode: TransformMode,
}

impl Default for ParameterSpec {
    fn default() -> Self {
        Self {
            no_suffixes: false,
            format: Format::default(),
            pixel_type: PixelType::default(),
            compressed_format: None,
            mirror_vertical: false,
            mirror_horizontal: false,
            scale: 1.0,
            width_scale: 1.0,
            height_scale: 1.0,
            width: None,
            height: None,
            aspect_ratio_mode: AspectRatioMode::default(),
            transform_mode: TransformMode::default(),
        }
    }
}

impl TryFrom<ConversionParams> for ParameterSpec {
    type Error = ValidationError;

    fn try_from(params: ConversionParams) -> Result<Self, Self::Error> {
        let defaults = ParameterSpec::default();
        let spec = ParameterSpec {
            no_suffixes: params.no_suffixes.unwrap_or(defaults.no_suffixes),
            format: params.format.unwrap_or(defaults.format),
            pixel_type: params.pixel_type.unwrap_or(defaults.pixel_type),
            compressed_format: params.compressed_format,
            mirror_vertical: params.mirror_vertical.unwrap_or(defaults.mirror_vertical),
            mirror_horizontal: params.mirror_horizontal.unwrap_or(defaults.mirror_horizontal),
            scale: params.scale.unwrap_or(defaults.scale),
            width_scale: params.width_scale.unwrap_or(defaults.width_scale),
            height_scale: params.height_scale.unwrap_or(defaults.height_scale),
            width: params.width.map(|v| dimension("width", v)).transpose()?,
            height: params.height.map(|v| dimension("height", v)).transpose()?,
            aspect_ratio_mode: params.aspect_ratio_mode.unwrap_or(defaults.aspect_ratio_mode),
            transform_mode: params.transform_mode.unwrap_or(defaults.transform_mode),
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl ParameterSpec {
    pub fn builder() -> ParameterSpecBuilder {
        ParameterSpecBuilder::default()
    }

    /// Shorthand for [`ConversionParams::from_pairs`] followed by validation.
    pub fn from_fields<'a, I>(fields: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        ConversionParams::from_pairs(fields)?.try_into()
    }

    pub fn no_suffixes(&self) -> bool {
        self.no_suffixes
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn compressed_format(&self) -> Option<CompressedFormat> {
        self.compressed_format
    }

    pub fn mirror_vertical(&self) -> bool {
        self.mirror_vertical
    }

    pub fn mirror_horizontal(&self) -> bool {
        self.mirror_horizontal
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn width_scale(&self) -> f64 {
        self.width_scale
    }

    pub fn height_scale(&self) -> f64 {
        self.height_scale
    }

    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn aspect_ratio_mode(&self) -> AspectRatioMode {
        self.aspect_ratio_mode
    }

    pub fn transform_mode(&self) -> TransformMode {
        self.transform_mode
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("scale", self.scale),
            ("width_scale", self.width_scale),
            ("height_scale", self.height_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::new(
                    field,
                    format!("{} must be a finite number greater than zero", value),
                ));
            }
        }
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if value == Some(0) {
                return Err(ValidationError::new(field, "must be a positive integer"));
            }
        }
        Ok(())
    }
}

fn dimension(field: &str, value: i64) -> Result<u32, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::new(field, "must be a positive integer"));
    }
    u32::try_from(value).map_err(|_| ValidationError::new(field, format!("{} is too large", value)))
}

#[derive(Clone, Debug, Default)]
pub struct ParameterSpecBuilder {
    spec: ParameterSpec,
}

impl ParameterSpecBuilder {
    pub fn no_suffixes(mut self, value: bool) -> Self {
        self.spec.no_suffixes = value;
        self
    }

    pub fn format(mut self, value: Format) -> Self {
        self.spec.format = value;
        self
    }

    pub fn pixel_type(mut self, value: PixelType) -> Self {
        self.spec.pixel_type = value;
        self
    }

    pub fn compressed_format(mut self, value: CompressedFormat) -> Self {
        self.spec.compressed_format = Some(value);
        self
    }

    pub fn mirror_vertical(mut self, value: bool) -> Self {
        self.spec.mirror_vertical = value;
        self
    }

    pub fn mirror_horizontal(mut self, value: bool) -> Self {
        self.spec.mirror_horizontal = value;
        self
    }

    pub fn scale(mut self, value: f64) -> Self {
        self.spec.scale = value;
        self
    }

    pub fn width_scale(mut self, value: f64) -> Self {
        self.spec.width_scale = value;
        self
    }

    pub fn height_scale(mut self, value: f64) -> Self {
        self.spec.height_scale = value;
        self
    }

    pub fn width(mut self, value: u32) -> Self {
        self.spec.width = Some(value);
        self
    }

    pub fn height(mut self, value: u32) -> Self {
        self.spec.height = Some(value);
        self
    }

    pub fn aspect_ratio_mode(mut self, value: AspectRatioMode) -> Self {
        self.spec.aspect_ratio_mode = value;
        self
    }

    pub fn transform_mode(mut self, value: TransformMode) -> Self {
        self.spec.transform_mode = value;
        self
    }

    pub fn build(self) -> Result<ParameterSpec, ValidationError> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fully_populated() {
        let spec = ParameterSpec::from_fields(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(spec, ParameterSpec::default());
        assert_eq!(spec.format(), Format::Rgba);
        assert_eq!(spec.pixel_type(), PixelType::UByte);
        assert_eq!(spec.compressed_format(), None);
        assert_eq!(spec.scale(), 1.0);
        assert_eq!(spec.width(), None);
        assert_eq!(spec.aspect_ratio_mode(), AspectRatioMode::Ignore);
        assert_eq!(spec.transform_mode(), TransformMode::Nearest);
        assert!(!spec.no_suffixes());
    }

    #[test]
    fn test_enum_values_accept_name_or_token() {
        let spec = ParameterSpec::from_fields([
            ("format", "BGR"),
            ("type", "GL_FLOAT"),
            ("compressed_format", "COMPRESSED_RG_RGTC2"),
            ("aspect_ratio_mode", "KeepAspectRatioByExpanding"),
            ("transform_mode", "linear"),
        ])
        .unwrap();

        assert_eq!(spec.format(), Format::Bgr);
        assert_eq!(spec.pixel_type(), PixelType::Float);
        assert_eq!(spec.compressed_format(), Some(CompressedFormat::RgRgtc2));
        assert_eq!(spec.aspect_ratio_mode(), AspectRatioMode::KeepByExpanding);
        assert_eq!(spec.transform_mode(), TransformMode::Linear);

        let spec = ParameterSpec::from_fields([
            ("pixel_type", "USHORT"),
            ("aspect_ratio", "Keep"),
            ("compressed_format", "GL_COMPRESSED_SRGB_ALPHA"),
        ])
        .unwrap();
        assert_eq!(spec.pixel_type(), PixelType::UShort);
        assert_eq!(spec.aspect_ratio_mode(), AspectRatioMode::Keep);
        assert_eq!(spec.compressed_format(), Some(CompressedFormat::SrgbAlpha));
    }

    #[test]
    fn test_unknown_enum_value_names_field() {
        let err = ParameterSpec::from_fields([("format", "CMYK")]).unwrap_err();
        assert_eq!(err.field(), "format");
        assert!(err.to_string().contains("CMYK"), "{}", err);

        let err = ParameterSpec::from_fields([("scale", "2"), ("type", "double")]).unwrap_err();
        assert_eq!(err.field(), "type");
    }

    #[test]
    fn test_negative_or_zero_dimensions_rejected() {
        let err = ParameterSpec::from_fields([("width", "-4")]).unwrap_err();
        assert_eq!(err.field(), "width");

        let err = ParameterSpec::from_fields([("height", "0")]).unwrap_err();
        assert_eq!(err.field(), "height");

        let err = ParameterSpec::from_fields([("width", "8589934592")]).unwrap_err();
        assert_eq!(err.field(), "width");

        let err = ParameterSpec::from_fields([("height", "tall")]).unwrap_err();
        assert_eq!(err.field(), "height");

        let err = ParameterSpec::builder().width(0).build().unwrap_err();
        assert_eq!(err.field(), "width");
    }

    #[test]
    fn test_later_pairs_win_and_empty_values_unset() {
        let spec = ParameterSpec::from_fields([
            ("format", "RGB"),
            ("compressed_format", "COMPRESSED_RGBA"),
            ("format", "BGRA"),
            ("compressed_format", ""),
            ("width", " "),
        ])
        .unwrap();
        assert_eq!(spec.format(), Format::Bgra);
        assert_eq!(spec.compressed_format(), None);
        assert_eq!(spec.width(), None);
    }

    #[test]
    fn test_scales_must_be_positive_and_finite() {
        for bad in ["0", "-1.5", "NaN", "inf", "abc"] {
            let err = ParameterSpec::from_fields([("width_scale", bad)]).unwrap_err();
            assert_eq!(err.field(), "width_scale", "value {}", bad);
        }
        let err = ParameterSpec::builder().scale(f64::NAN).build().unwrap_err();
        assert_eq!(err.field(), "scale");

        let spec = ParameterSpec::from_fields([("scale", "0.5")]).unwrap();
        assert_eq!(spec.scale(), 0.5);
    }

    #[test]
    fn test_booleans_and_unknown_fields() {
        let spec = ParameterSpec::from_fields([
            ("mirror_vertical", "true"),
            ("mirror_horizontal", "false"),
            ("no_suffixes", "true"),
            ("shader", "ignored.frag"),
        ])
        .unwrap();
        assert!(spec.mirror_vertical());
        assert!(!spec.mirror_horizontal());
        assert!(spec.no_suffixes());

        let err = ParameterSpec::from_fields([("mirror_vertical", "maybe")]).unwrap_err();
        assert_eq!(err.field(), "mirror_vertical");
    }

    #[test]
    fn test_params_deserialize_from_query_string() {
        let params: ConversionParams =
            serde_urlencoded::from_str("format=GL_RGB&width=64&mirror_vertical=true").unwrap();
        assert_eq!(params.format, Some(Format::Rgb));
        assert_eq!(params.width, Some(64));
        assert_eq!(params.mirror_vertical, Some(true));
        assert_eq!(params.scale, None);

        let spec = ParameterSpec::try_from(params).unwrap();
        assert_eq!(spec.width(), Some(64));
        assert_eq!(spec.scale(), 1.0);
    }
}
