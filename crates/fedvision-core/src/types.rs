//! Core type definitions shared across the workspace.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Named split of a dataset source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataSplit {
    /// Training data (the split that gets partitioned)
    Train,
    /// Held-out test data (used for centralized evaluation)
    Test,
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

/// Pretrained model entrypoints known to the model hub
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Entrypoint {
    /// EfficientNet-B0
    #[serde(rename = "nvidia_efficientnet_b0")]
    EfficientNetB0,
    /// EfficientNet-B4
    #[serde(rename = "nvidia_efficientnet_b4")]
    EfficientNetB4,
    /// EfficientNet-B0 with wide squeeze-excitation
    #[serde(rename = "nvidia_efficientnet_widese_b0")]
    EfficientNetWideSeB0,
    /// EfficientNet-B4 with wide squeeze-excitation
    #[serde(rename = "nvidia_efficientnet_widese_b4")]
    EfficientNetWideSeB4,
}

impl Entrypoint {
    /// All entrypoints, in hub listing order
    pub const ALL: [Entrypoint; 4] = [
        Entrypoint::EfficientNetB0,
        Entrypoint::EfficientNetB4,
        Entrypoint::EfficientNetWideSeB0,
        Entrypoint::EfficientNetWideSeB4,
    ];

    /// Hub name of the entrypoint
    pub fn name(&self) -> &'static str {
        match self {
            Entrypoint::EfficientNetB0 => "nvidia_efficientnet_b0",
            Entrypoint::EfficientNetB4 => "nvidia_efficientnet_b4",
            Entrypoint::EfficientNetWideSeB0 => "nvidia_efficientnet_widese_b0",
            Entrypoint::EfficientNetWideSeB4 => "nvidia_efficientnet_widese_b4",
        }
    }
}

impl std::fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Entrypoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entrypoint::ALL
            .into_iter()
            .find(|entry| entry.name() == s)
            .ok_or_else(|| Error::UnknownEntrypoint(s.to_string()))
    }
}

/// Image dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of channels (e.g., 3 for RGB)
    pub channels: u32,
}

impl ImageDimensions {
    /// Creates new image dimensions
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Total number of values in a CHW tensor of these dimensions
    pub fn num_values(&self) -> usize {
        (self.width * self.height * self.channels) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_split_display() {
        assert_eq!(DataSplit::Train.to_string(), "train");
        assert_eq!(DataSplit::Test.to_string(), "test");
    }

    #[test]
    fn test_entrypoint_parse() {
        let entry: Entrypoint = "nvidia_efficientnet_b0".parse().unwrap();
        assert_eq!(entry, Entrypoint::EfficientNetB0);

        for entry in Entrypoint::ALL {
            assert_eq!(entry.name().parse::<Entrypoint>().unwrap(), entry);
        }
    }

    #[test]
    fn test_entrypoint_unknown() {
        let err = "resnet9000".parse::<Entrypoint>().unwrap_err();
        assert!(matches!(err, Error::UnknownEntrypoint(name) if name == "resnet9000"));
    }

    #[test]
    fn test_entrypoint_serde_name() {
        let json = serde_json::to_string(&Entrypoint::EfficientNetWideSeB4).unwrap();
        assert_eq!(json, "\"nvidia_efficientnet_widese_b4\"");
    }

    #[test]
    fn test_image_dimensions() {
        let dims = ImageDimensions::new(224, 224, 3);
        assert_eq!(dims.width, 224);
        assert_eq!(dims.height, 224);
        assert_eq!(dims.channels, 3);
        assert_eq!(dims.num_values(), 224 * 224 * 3);
    }
}
