//! CUBE lookup-table parsing and validation.
//!
//! A file is a header of directives (`TITLE`, `LUT_3D_SIZE` or `LUT_1D_SIZE`,
//! `DOMAIN_MIN`, `DOMAIN_MAX`) followed by one RGB triple per lattice sample.
//! For 3D tables red is the fastest-varying axis, then green, then blue.

use serde::Serialize;
use utoipa::ToSchema;

use super::error::LutError;
use super::model::{ColorSpace, LutDimension};

pub const MIN_LUT_SIZE: u32 = 2;
pub const MAX_LUT_SIZE: u32 = 256;

// Malformed-row messages past this count are folded into a summary line.
const MAX_ROW_ERRORS: usize = 10;

const DEFAULT_DOMAIN_MIN: [f32; 3] = [0.0, 0.0, 0.0];
const DEFAULT_DOMAIN_MAX: [f32; 3] = [1.0, 1.0, 1.0];

// Earliest keyword in the title wins, so "SLog3 to Rec709" reads as SLog3.
const COLOR_SPACE_KEYWORDS: &[(&str, ColorSpace)] = &[
    ("rec709", ColorSpace::Rec709),
    ("rec.709", ColorSpace::Rec709),
    ("709", ColorSpace::Rec709),
    ("p3", ColorSpace::P3D65),
    ("s-log", ColorSpace::SLog3),
    ("slog", ColorSpace::SLog3),
    ("logc", ColorSpace::LogC),
    ("hlg", ColorSpace::Hlg),
    ("2084", ColorSpace::Pq),
    ("pq", ColorSpace::Pq),
    ("linear", ColorSpace::Linear),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLut {
    pub title: Option<String>,
    pub dimension: LutDimension,
    pub size: u32,
    pub domain_min: [f32; 3],
    pub domain_max: [f32; 3],
    pub data: Vec<[f32; 3]>,
    pub color_space: ColorSpace,
}

impl ParsedLut {
    /// Output triple for lattice coordinates `(r, g, b)`.
    ///
    /// 1D tables are per-channel curves, so each output channel reads its own row.
    pub fn sample(&self, r: usize, g: usize, b: usize) -> Option<[f32; 3]> {
        let n = self.size as usize;
        if r >= n || g >= n || b >= n {
            return None;
        }
        match self.dimension {
            LutDimension::ThreeD => self.data.get(r + g * n + b * n * n).copied(),
            LutDimension::OneD => {
                let red = self.data.get(r)?;
                let green = self.data.get(g)?;
                let blue = self.data.get(b)?;
                Some([red[0], green[1], blue[2]])
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LutDetails {
    pub title: Option<String>,
    pub dimension: LutDimension,
    pub size: u32,
    pub data_rows: u64,
    pub domain_min: [f32; 3],
    pub domain_max: [f32; 3],
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LutValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub details: Option<LutDetails>,
}

/// Validates raw file bytes without keeping the lattice in memory.
pub fn validate(bytes: &[u8]) -> LutValidation {
    match decode(bytes) {
        Ok(text) => Scan::run(text, false).into_validation(),
        Err(message) => LutValidation {
            valid: false,
            errors: vec![message],
            warnings: Vec::new(),
            details: None,
        },
    }
}

pub fn parse(text: &str) -> Result<ParsedLut, LutError> {
    Scan::run(text, true).into_parsed()
}

pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedLut, LutError> {
    let text = decode(bytes).map_err(|message| LutError::Validation {
        errors: vec![message],
        warnings: Vec::new(),
    })?;
    parse(text)
}

pub fn infer_color_space(title: Option<&str>) -> ColorSpace {
    let Some(title) = title else {
        return ColorSpace::Unknown;
    };
    let lower = title.to_ascii_lowercase();

    COLOR_SPACE_KEYWORDS
        .iter()
        .filter_map(|(keyword, space)| lower.find(keyword).map(|pos| (pos, *space)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, space)| space)
        .unwrap_or(ColorSpace::Unknown)
}

fn decode(bytes: &[u8]) -> Result<&str, String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| format!("LUT file is not valid UTF-8 text: {}", e))
}

struct SizeDirective {
    dimension: LutDimension,
    value: Option<u32>,
}

#[derive(Default)]
struct Scan {
    title: Option<String>,
    sizes: Vec<SizeDirective>,
    domain_min: Option<[f32; 3]>,
    domain_max: Option<[f32; 3]>,
    data: Vec<[f32; 3]>,
    data_rows: u64,
    malformed_rows: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Scan {
    fn run(text: &str, keep_data: bool) -> Self {
        let mut scan = Scan::default();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let starts_alpha = line
                .chars()
                .next()
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false);

            if starts_alpha {
                scan.directive(line_no, line);
            } else {
                scan.data_row(line_no, line, keep_data);
            }
        }

        scan.finish();
        scan
    }

    fn directive(&mut self, line_no: usize, line: &str) {
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        match keyword {
            "TITLE" => {
                if self.title.is_some() {
                    self.warnings
                        .push(format!("line {}: duplicate TITLE, keeping the first", line_no));
                    return;
                }
                let title = rest.trim_matches('"').trim();
                if !title.is_empty() {
                    self.title = Some(title.to_string());
                }
            }
            "LUT_3D_SIZE" | "LUT_1D_SIZE" => {
                let dimension = if keyword == "LUT_3D_SIZE" {
                    LutDimension::ThreeD
                } else {
                    LutDimension::OneD
                };
                let value = rest.parse::<u32>().ok();
                if value.is_none() {
                    self.errors.push(format!(
                        "line {}: invalid {} value '{}'",
                        line_no, keyword, rest
                    ));
                }
                self.sizes.push(SizeDirective { dimension, value });
            }
            "DOMAIN_MIN" | "DOMAIN_MAX" => match parse_triple(rest) {
                Some(triple) if keyword == "DOMAIN_MIN" => self.domain_min = Some(triple),
                Some(triple) => self.domain_max = Some(triple),
                None => self.errors.push(format!(
                    "line {}: {} needs three numeric values",
                    line_no, keyword
                )),
            },
            other => self.warnings.push(format!(
                "line {}: unrecognized directive '{}' ignored",
                line_no, other
            )),
        }
    }

    fn data_row(&mut self, line_no: usize, line: &str, keep_data: bool) {
        self.data_rows += 1;

        match parse_triple(line) {
            Some(triple) => {
                if keep_data {
                    self.data.push(triple);
                }
            }
            None => {
                self.malformed_rows += 1;
                if self.malformed_rows <= MAX_ROW_ERRORS {
                    self.errors.push(format!(
                        "line {}: expected three numeric values, got '{}'",
                        line_no, line
                    ));
                }
            }
        }
    }

    fn finish(&mut self) {
        if self.malformed_rows > MAX_ROW_ERRORS {
            self.errors.push(format!(
                "{} more malformed data rows",
                self.malformed_rows - MAX_ROW_ERRORS
            ));
        }

        match self.sizes.as_slice() {
            [] => self
                .errors
                .push("missing LUT_3D_SIZE or LUT_1D_SIZE directive".to_string()),
            [single] => {
                if let Some(size) = single.value {
                    if !(MIN_LUT_SIZE..=MAX_LUT_SIZE).contains(&size) {
                        self.errors.push(format!(
                            "LUT size {} is outside the supported range [{}, {}]",
                            size, MIN_LUT_SIZE, MAX_LUT_SIZE
                        ));
                    } else {
                        let expected = single.dimension.expected_rows(size);
                        if self.data_rows != expected {
                            self.errors.push(format!(
                                "data row count mismatch: {} size {} needs {} rows, found {}",
                                single.dimension.as_str(),
                                size,
                                expected,
                                self.data_rows
                            ));
                        }
                    }
                }
            }
            many => self.errors.push(format!(
                "expected exactly one size directive, found {}",
                many.len()
            )),
        }

        if self.title.is_none() {
            self.warnings.push("missing TITLE".to_string());
        }
        if self.domain_min.is_none() || self.domain_max.is_none() {
            self.warnings
                .push("missing DOMAIN_MIN/DOMAIN_MAX, defaulting to [0, 1]".to_string());
        }

        let min = self.domain_min.unwrap_or(DEFAULT_DOMAIN_MIN);
        let max = self.domain_max.unwrap_or(DEFAULT_DOMAIN_MAX);
        if min.iter().zip(max.iter()).any(|(lo, hi)| lo >= hi) {
            self.errors
                .push("DOMAIN_MIN must be below DOMAIN_MAX on every channel".to_string());
        }
    }

    fn size(&self) -> Option<(LutDimension, u32)> {
        match self.sizes.as_slice() {
            [single] => single.value.map(|value| (single.dimension, value)),
            _ => None,
        }
    }

    fn details(&self) -> Option<LutDetails> {
        let (dimension, size) = self.size()?;
        Some(LutDetails {
            title: self.title.clone(),
            dimension,
            size,
            data_rows: self.data_rows,
            domain_min: self.domain_min.unwrap_or(DEFAULT_DOMAIN_MIN),
            domain_max: self.domain_max.unwrap_or(DEFAULT_DOMAIN_MAX),
            color_space: infer_color_space(self.title.as_deref()),
        })
    }

    fn into_validation(self) -> LutValidation {
        let details = self.details();
        LutValidation {
            valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
            details,
        }
    }

    fn into_parsed(self) -> Result<ParsedLut, LutError> {
        let size = self.size();
        let (dimension, size) = match size {
            Some(size) if self.errors.is_empty() => size,
            _ => {
                return Err(LutError::Validation {
                    errors: self.errors,
                    warnings: self.warnings,
                });
            }
        };

        let color_space = infer_color_space(self.title.as_deref());
        Ok(ParsedLut {
            title: self.title,
            dimension,
            size,
            domain_min: self.domain_min.unwrap_or(DEFAULT_DOMAIN_MIN),
            domain_max: self.domain_max.unwrap_or(DEFAULT_DOMAIN_MAX),
            data: self.data,
            color_space,
        })
    }
}

fn parse_triple(text: &str) -> Option<[f32; 3]> {
    let mut values = text.split_whitespace().map(|token| token.parse::<f32>());
    let triple = [
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
    ];
    if values.next().is_some() || triple.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(triple)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(size: u32, rows: usize) -> String {
        let mut text = format!("TITLE \"Test\"\nLUT_3D_SIZE {}\nDOMAIN_MIN 0 0 0\nDOMAIN_MAX 1 1 1\n", size);
        for i in 0..rows {
            let v = i as f32 / rows.max(1) as f32;
            text.push_str(&format!("{:.4} {:.4} {:.4}\n", v, v, v));
        }
        text
    }

    const IDENTITY_2: &str = "# identity\nTITLE \"Identity\"\nLUT_3D_SIZE 2\nDOMAIN_MIN 0.0 0.0 0.0\nDOMAIN_MAX 1.0 1.0 1.0\n\n\
0.0 0.0 0.0\n1.0 0.0 0.0\n0.0 1.0 0.0\n1.0 1.0 0.0\n\
0.0 0.0 1.0\n1.0 0.0 1.0\n0.0 1.0 1.0\n1.0 1.0 1.0\n";

    #[test]
    fn identity_lattice_parses_red_fastest() {
        let lut = parse(IDENTITY_2).unwrap();
        assert_eq!(lut.dimension, LutDimension::ThreeD);
        assert_eq!(lut.size, 2);
        assert_eq!(lut.data.len(), 8);
        assert_eq!(lut.sample(1, 0, 0), Some([1.0, 0.0, 0.0]));
        assert_eq!(lut.sample(0, 1, 0), Some([0.0, 1.0, 0.0]));
        assert_eq!(lut.sample(0, 0, 1), Some([0.0, 0.0, 1.0]));
        assert_eq!(lut.sample(2, 0, 0), None);
    }

    #[test]
    fn exact_row_count_is_valid() {
        let report = validate(cube(3, 27).as_bytes());
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        let details = report.details.unwrap();
        assert_eq!(details.data_rows, 27);
        assert_eq!(details.size, 3);
    }

    #[test]
    fn off_by_one_row_counts_are_rejected() {
        for rows in [26, 28] {
            let report = validate(cube(3, rows).as_bytes());
            assert!(!report.valid);
            assert!(
                report.errors.iter().any(|e| e.contains("row count mismatch")),
                "{:?}",
                report.errors
            );
        }
    }

    #[test]
    fn size_outside_range_is_rejected_regardless_of_rows() {
        let too_small = validate(cube(1, 1).as_bytes());
        assert!(!too_small.valid);
        assert!(too_small.errors.iter().any(|e| e.contains("outside the supported range")));

        let too_large = validate("LUT_3D_SIZE 257\n0 0 0\n".as_bytes());
        assert!(!too_large.valid);
        assert!(too_large.errors.iter().any(|e| e.contains("outside the supported range")));
        assert!(!too_large.errors.iter().any(|e| e.contains("row count")));
    }

    #[test]
    fn missing_title_and_domain_are_warnings_only() {
        let text = "LUT_1D_SIZE 2\n0 0 0\n1 1 1\n";
        let report = validate(text.as_bytes());
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.warnings.len(), 2);

        let lut = parse(text).unwrap();
        assert_eq!(lut.dimension, LutDimension::OneD);
        assert_eq!(lut.domain_min, [0.0, 0.0, 0.0]);
        assert_eq!(lut.domain_max, [1.0, 1.0, 1.0]);
        assert_eq!(lut.sample(1, 0, 1), Some([1.0, 0.0, 1.0]));
    }

    #[test]
    fn size_directive_must_appear_exactly_once() {
        let none = validate(b"TITLE \"x\"\n0 0 0\n");
        assert!(none.errors.iter().any(|e| e.contains("missing LUT_3D_SIZE")));

        let both = validate(b"LUT_3D_SIZE 2\nLUT_1D_SIZE 2\n0 0 0\n1 1 1\n");
        assert!(both.errors.iter().any(|e| e.contains("exactly one size directive")));
        assert!(both.details.is_none());
    }

    #[test]
    fn malformed_rows_and_domains_are_errors() {
        let bad_row = validate(b"LUT_1D_SIZE 2\n0 0\n1 1 1\n");
        assert!(bad_row.errors.iter().any(|e| e.starts_with("line 2")));

        let inverted = validate(b"LUT_1D_SIZE 2\nDOMAIN_MIN 1 1 1\nDOMAIN_MAX 0 0 0\n0 0 0\n1 1 1\n");
        assert!(inverted.errors.iter().any(|e| e.contains("DOMAIN_MIN")));
    }

    #[test]
    fn unknown_directives_warn_and_bom_is_tolerated() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(b"TITLE \"x\"\nLUT_3D_INPUT_RANGE 0 1\nLUT_1D_SIZE 2\n0 0 0\n1 1 1\n");
        let report = validate(&bytes);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.iter().any(|w| w.contains("LUT_3D_INPUT_RANGE")));
    }

    #[test]
    fn non_utf8_input_is_rejected() {
        let report = validate(&[0xff, 0xfe, 0x00]);
        assert!(!report.valid);
        assert!(parse_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn color_space_follows_earliest_title_keyword() {
        assert_eq!(infer_color_space(Some("SLog3 to Rec709")), ColorSpace::SLog3);
        assert_eq!(infer_color_space(Some("Rec709 Film Look")), ColorSpace::Rec709);
        assert_eq!(infer_color_space(Some("ARRI LogC K1S1")), ColorSpace::LogC);
        assert_eq!(infer_color_space(Some("P3 Teal Orange")), ColorSpace::P3D65);
        assert_eq!(infer_color_space(Some("Warm Look")), ColorSpace::Unknown);
        assert_eq!(infer_color_space(None), ColorSpace::Unknown);
    }
}
