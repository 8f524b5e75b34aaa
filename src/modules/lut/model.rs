use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Color spaces a LUT or a source clip can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
pub enum ColorSpace {
    Rec709,
    P3D65,
    SLog3,
    #[serde(rename = "HLG")]
    Hlg,
    #[serde(rename = "PQ")]
    Pq,
    Linear,
    LogC,
    #[default]
    Unknown,
}

impl ColorSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorSpace::Rec709 => "Rec709",
            ColorSpace::P3D65 => "P3D65",
            ColorSpace::SLog3 => "SLog3",
            ColorSpace::Hlg => "HLG",
            ColorSpace::Pq => "PQ",
            ColorSpace::Linear => "Linear",
            ColorSpace::LogC => "LogC",
            ColorSpace::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "rec709" | "bt709" | "709" => Ok(ColorSpace::Rec709),
            "p3d65" | "p3" | "displayp3" => Ok(ColorSpace::P3D65),
            "slog3" | "slog" => Ok(ColorSpace::SLog3),
            "hlg" => Ok(ColorSpace::Hlg),
            "pq" | "st2084" => Ok(ColorSpace::Pq),
            "linear" => Ok(ColorSpace::Linear),
            "logc" | "logc3" => Ok(ColorSpace::LogC),
            "unknown" => Ok(ColorSpace::Unknown),
            _ => Err(format!("unknown color space: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum LutDimension {
    #[serde(rename = "1D")]
    OneD,
    #[serde(rename = "3D")]
    ThreeD,
}

impl LutDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            LutDimension::OneD => "1D",
            LutDimension::ThreeD => "3D",
        }
    }

    /// Number of data rows a lattice of `size` must contain.
    pub fn expected_rows(&self, size: u32) -> u64 {
        let size = u64::from(size);
        match self {
            LutDimension::OneD => size,
            LutDimension::ThreeD => size * size * size,
        }
    }
}

impl FromStr for LutDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1D" => Ok(LutDimension::OneD),
            "3D" => Ok(LutDimension::ThreeD),
            other => Err(format!("unknown LUT dimension: {}", other)),
        }
    }
}

/// Catalog entry for a stored, validated LUT file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LutDescriptor {
    pub id: Uuid,
    pub name: String,
    pub dimension: LutDimension,
    pub color_space: ColorSpace,
    pub size: u32,
    pub hash: String,
    pub storage_path: String,
    pub byte_size: u64,
    pub metadata: HashMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub deleted_at: Option<OffsetDateTime>,
}

impl LutDescriptor {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
