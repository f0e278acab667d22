use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Pixel dimensions of an image.
///
/// Serialized as a two-element `[width, height]` array on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions after multiplying both axes by `scale`.
    ///
    /// Saturates instead of overflowing; callers validate the scale range
    /// before this is reached.
    pub fn scaled(self, scale: u32) -> Self {
        Self {
            width: self.width.saturating_mul(scale),
            height: self.height.saturating_mul(scale),
        }
    }

    pub fn pixels(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Serialize for ImageSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.width, self.height].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ImageSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [width, height] = <[u32; 2]>::deserialize(deserializer)?;
        Ok(Self { width, height })
    }
}
