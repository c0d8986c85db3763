//! Cloud Vision feature tags and parsing of comma-separated feature lists.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A capability requested from the Vision API (`Feature.Type`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    FaceDetection,
    LandmarkDetection,
    LogoDetection,
    LabelDetection,
    TextDetection,
    DocumentTextDetection,
    SafeSearchDetection,
    ImageProperties,
    CropHints,
    WebDetection,
    ProductSearch,
    ObjectLocalization,
}

impl FeatureType {
    /// Every requestable feature; `TYPE_UNSPECIFIED` is deliberately absent.
    pub const ALL: [FeatureType; 12] = [
        FeatureType::FaceDetection,
        FeatureType::LandmarkDetection,
        FeatureType::LogoDetection,
        FeatureType::LabelDetection,
        FeatureType::TextDetection,
        FeatureType::DocumentTextDetection,
        FeatureType::SafeSearchDetection,
        FeatureType::ImageProperties,
        FeatureType::CropHints,
        FeatureType::WebDetection,
        FeatureType::ProductSearch,
        FeatureType::ObjectLocalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::FaceDetection => "FACE_DETECTION",
            FeatureType::LandmarkDetection => "LANDMARK_DETECTION",
            FeatureType::LogoDetection => "LOGO_DETECTION",
            FeatureType::LabelDetection => "LABEL_DETECTION",
            FeatureType::TextDetection => "TEXT_DETECTION",
            FeatureType::DocumentTextDetection => "DOCUMENT_TEXT_DETECTION",
            FeatureType::SafeSearchDetection => "SAFE_SEARCH_DETECTION",
            FeatureType::ImageProperties => "IMAGE_PROPERTIES",
            FeatureType::CropHints => "CROP_HINTS",
            FeatureType::WebDetection => "WEB_DETECTION",
            FeatureType::ProductSearch => "PRODUCT_SEARCH",
            FeatureType::ObjectLocalization => "OBJECT_LOCALIZATION",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = ();

    /// Exact, case-sensitive match on the API name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureType::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or(())
    }
}

/// One entry of `AnnotateImageRequest.features`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: FeatureType,
}

impl From<FeatureType> for Feature {
    fn from(kind: FeatureType) -> Self {
        Self { kind }
    }
}

/// Parse a comma-delimited list of feature names.
///
/// Tokens are upper-cased and stripped of quotes and whitespace. Unknown
/// names are dropped without error, so `","` or `"bogus"` yield an empty list.
pub fn build_features_list(feature_names: &str) -> Vec<Feature> {
    feature_names
        .split(',')
        .filter_map(|token| {
            let name = token.trim().trim_matches('"').trim().to_ascii_uppercase();
            name.parse::<FeatureType>().ok().map(Feature::from)
        })
        .collect()
}
