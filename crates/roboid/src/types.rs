use crate::Error;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prefix of every image data URI handed back to callers.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Requested avatar size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Small,
    Large,
}

impl Size {
    /// Edge length of the rendered square, in pixels.
    pub const fn pixels(self) -> u32 {
        match self {
            Size::Small => 80,
            Size::Large => 256,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Size::Small => "small",
            Size::Large => "large",
        }
    }

    /// Maps an edge length back to a size, as used in bridge frames.
    pub fn from_pixels(px: u32) -> Option<Self> {
        match px {
            80 => Some(Size::Small),
            256 => Some(Size::Large),
            _ => None,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Size {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Size::Small),
            "large" => Ok(Size::Large),
            other => Err(Error::InvalidRequest {
                reason: format!("unknown size `{other}`"),
            }),
        }
    }
}

/// Key identifying a request's inputs for caching and coalescing.
///
/// Displays as `size;seed` for images and as the raw seed for names. The two
/// kinds never compare equal, even when their display forms coincide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Image { size: Size, seed: Arc<str> },
    Name { seed: Arc<str> },
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Image { size, seed } => write!(f, "{size};{seed}"),
            Fingerprint::Name { seed } => f.write_str(seed),
        }
    }
}

/// A unit of work understood by the rendering engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    Image { seed: Arc<str>, size: Size },
    Name { seed: Arc<str> },
}

impl Job {
    pub fn image(seed: impl Into<Arc<str>>, size: Size) -> Self {
        Job::Image {
            seed: seed.into(),
            size,
        }
    }

    pub fn name(seed: impl Into<Arc<str>>) -> Self {
        Job::Name { seed: seed.into() }
    }

    pub fn seed(&self) -> &str {
        match self {
            Job::Image { seed, .. } | Job::Name { seed } => seed,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Job::Image { seed, size } => Fingerprint::Image {
                size: *size,
                seed: Arc::clone(seed),
            },
            Job::Name { seed } => Fingerprint::Name {
                seed: Arc::clone(seed),
            },
        }
    }
}

/// A job admitted by the dispatcher that has no cached or pending result.
#[derive(Clone, Debug)]
pub struct Task {
    pub fingerprint: Fingerprint,
    pub job: Job,
}

impl From<Job> for Task {
    fn from(job: Job) -> Self {
        Self {
            fingerprint: job.fingerprint(),
            job,
        }
    }
}

/// A rendered avatar: the PNG bytes and the matching data URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    png: Bytes,
    data_uri: Arc<str>,
}

impl ImageData {
    pub fn from_png(png: Bytes) -> Self {
        let mut data_uri = String::with_capacity(PNG_DATA_URI_PREFIX.len() + png.len() * 4 / 3 + 4);
        data_uri.push_str(PNG_DATA_URI_PREFIX);
        BASE64.encode_string(&png, &mut data_uri);
        Self {
            png,
            data_uri: data_uri.into(),
        }
    }

    /// Builds image data from a base64 payload received over a bridge.
    pub fn from_base64(payload: &str) -> crate::Result<Self> {
        let png = BASE64.decode(payload).map_err(|e| Error::Protocol {
            reason: format!("invalid base64 image payload: {e}"),
        })?;
        Ok(Self {
            png: Bytes::from(png),
            data_uri: format!("{PNG_DATA_URI_PREFIX}{payload}").into(),
        })
    }

    pub fn png(&self) -> &Bytes {
        &self.png
    }

    pub fn data_uri(&self) -> &Arc<str> {
        &self.data_uri
    }

    /// The base64 part of the data URI.
    pub fn base64(&self) -> &str {
        &self.data_uri[PNG_DATA_URI_PREFIX.len()..]
    }
}

/// A completed, cacheable result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    Image(ImageData),
    Name(Arc<str>),
}

impl Artifact {
    /// The value handed to UI callers: a data URI for images, the name itself
    /// otherwise.
    pub fn to_display(&self) -> String {
        match self {
            Artifact::Image(image) => image.data_uri().to_string(),
            Artifact::Name(name) => name.to_string(),
        }
    }

    /// The value carried in a bridge response.
    pub fn to_payload(&self) -> String {
        match self {
            Artifact::Image(image) => image.base64().to_string(),
            Artifact::Name(name) => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_fingerprint_displays_size_then_seed() {
        let job = Job::image("seedX", Size::Large);
        assert_eq!(job.fingerprint().to_string(), "large;seedX");
        assert_eq!(Job::name("seedX").fingerprint().to_string(), "seedX");
    }

    #[test]
    fn name_and_image_fingerprints_never_collide() {
        let image = Job::image("x", Size::Small).fingerprint();
        let name = Job::name("small;x").fingerprint();
        assert_eq!(image.to_string(), name.to_string());
        assert_ne!(image, name);
    }

    #[test]
    fn size_pixels_round_trip() {
        assert_eq!(Size::from_pixels(Size::Small.pixels()), Some(Size::Small));
        assert_eq!(Size::from_pixels(Size::Large.pixels()), Some(Size::Large));
        assert_eq!(Size::from_pixels(100), None);
        assert!("huge".parse::<Size>().is_err());
    }

    #[test]
    fn image_data_exposes_uri_and_payload() {
        let image = ImageData::from_png(Bytes::from_static(b"\x89PNG"));
        assert!(image.data_uri().starts_with(PNG_DATA_URI_PREFIX));
        assert_eq!(image.base64(), "iVBORw==");

        let decoded = ImageData::from_base64(image.base64()).unwrap();
        assert_eq!(decoded, image);
        assert!(ImageData::from_base64("not base64!").is_err());
    }
}
