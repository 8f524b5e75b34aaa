//! Turns a LUT and probed source metadata into an ffmpeg recipe.
//!
//! Everything here is pure: the same inputs always produce the same stages
//! and arguments, and nothing touches the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::probe::MediaMetadata;
use crate::modules::lut::model::{ColorSpace, LutDimension};

/// Canonical space every clip is normalized to before the LUT is applied.
pub const WORKING_COLOR_SPACE: ColorSpace = ColorSpace::Rec709;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Trilinear,
    Tetrahedral,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Trilinear => "trilinear",
            Interpolation::Tetrahedral => "tetrahedral",
        }
    }

    fn for_dimension(&self, dimension: LutDimension) -> &'static str {
        match (dimension, self) {
            (LutDimension::ThreeD, _) => self.as_str(),
            (LutDimension::OneD, Interpolation::Nearest) => "nearest",
            (LutDimension::OneD, _) => "linear",
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Interpolation::Nearest),
            "trilinear" => Ok(Interpolation::Trilinear),
            "tetrahedral" => Ok(Interpolation::Tetrahedral),
            other => Err(format!("unknown interpolation mode: {}", other)),
        }
    }
}

/// Per-job transform options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradeOptions {
    /// Blend opacity of the graded signal in (0, 1]. Unset means full strength.
    pub strength: Option<f32>,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Overrides the probed source color space.
    pub input_color_space: Option<ColorSpace>,
    pub output_color_space: Option<ColorSpace>,
}

/// On-disk LUT the recipe points ffmpeg at.
#[derive(Debug, Clone, PartialEq)]
pub struct LutRef {
    pub path: PathBuf,
    pub dimension: LutDimension,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterStage {
    ColorConvert {
        from: ColorSpace,
        to: ColorSpace,
        filter: String,
    },
    Split,
    ApplyLut {
        path: PathBuf,
        dimension: LutDimension,
        interpolation: Interpolation,
    },
    Blend {
        opacity: f32,
    },
}

impl FilterStage {
    fn filter(&self) -> String {
        match self {
            FilterStage::ColorConvert { filter, .. } => filter.clone(),
            FilterStage::Split => "split=2".to_string(),
            FilterStage::ApplyLut {
                path,
                dimension,
                interpolation,
            } => {
                let name = match dimension {
                    LutDimension::ThreeD => "lut3d",
                    LutDimension::OneD => "lut1d",
                };
                format!(
                    "{}=file={}:interp={}",
                    name,
                    quote_filter_value(&path.to_string_lossy()),
                    interpolation.for_dimension(*dimension)
                )
            }
            FilterStage::Blend { opacity } => {
                format!("blend=all_mode=normal:all_opacity={}", opacity)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    H264,
    Hevc,
    ProRes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Mov,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mov => "mov",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Mov => "video/quicktime",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodecParams {
    pub family: CodecFamily,
    pub args: Vec<String>,
    pub container: Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Copy,
    Disabled,
}

/// Immutable transcoding plan for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRecipe {
    pub stages: Vec<FilterStage>,
    pub video: CodecParams,
    pub audio: AudioMode,
    /// Pass-through decisions worth surfacing in logs.
    pub notes: Vec<String>,
}

impl TransformRecipe {
    pub fn is_blended(&self) -> bool {
        self.stages.iter().any(|s| matches!(s, FilterStage::Blend { .. }))
    }

    pub fn output_extension(&self) -> &'static str {
        self.video.container.extension()
    }

    pub fn content_type(&self) -> &'static str {
        self.video.container.content_type()
    }

    /// Renders the stages as a `-filter_complex` graph ending in `[vout]`.
    pub fn filter_graph(&self) -> String {
        let mut chains = Vec::with_capacity(self.stages.len());
        let mut current = "0:v".to_string();
        let mut untouched: Option<String> = None;
        let last = self.stages.len().saturating_sub(1);

        for (idx, stage) in self.stages.iter().enumerate() {
            let out = if idx == last {
                "vout".to_string()
            } else {
                format!("v{}", idx)
            };

            match stage {
                FilterStage::Split => {
                    let base = format!("base{}", idx);
                    chains.push(format!("[{}]split=2[{}][{}]", current, base, out));
                    untouched = Some(base);
                }
                FilterStage::Blend { .. } => {
                    let base = untouched.take().unwrap_or_else(|| "0:v".to_string());
                    chains.push(format!("[{}][{}]{}[{}]", current, base, stage.filter(), out));
                }
                _ => chains.push(format!("[{}]{}[{}]", current, stage.filter(), out)),
            }
            current = out;
        }

        if chains.is_empty() {
            return "[0:v]null[vout]".to_string();
        }
        chains.join(";")
    }

    pub fn to_args(&self, input: &str, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i", input]
            .iter()
            .map(|s| s.to_string())
            .collect();

        args.push("-filter_complex".into());
        args.push(self.filter_graph());
        args.push("-map".into());
        args.push("[vout]".into());

        args.extend(self.video.args.iter().cloned());

        match self.audio {
            AudioMode::Copy => {
                args.extend(["-map", "0:a?", "-c:a", "copy"].map(String::from));
            }
            AudioMode::Disabled => args.push("-an".into()),
        }

        if self.video.container == Container::Mp4 {
            args.extend(["-movflags", "+faststart"].map(String::from));
        }

        args.push(output.to_string_lossy().into_owned());
        args
    }
}

impl fmt::Display for TransformRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filter_graph())
    }
}

pub fn build_recipe(meta: &MediaMetadata, lut: &LutRef, options: &GradeOptions) -> TransformRecipe {
    let mut stages = Vec::new();
    let mut notes = Vec::new();

    let input_space = options.input_color_space.unwrap_or(meta.color_space);
    if input_space != WORKING_COLOR_SPACE {
        match conversion_filter(input_space, WORKING_COLOR_SPACE) {
            Some(filter) => stages.push(FilterStage::ColorConvert {
                from: input_space,
                to: WORKING_COLOR_SPACE,
                filter,
            }),
            None => notes.push(format!(
                "no conversion from {} to {}, passing input through",
                input_space, WORKING_COLOR_SPACE
            )),
        }
    }

    let apply = FilterStage::ApplyLut {
        path: lut.path.clone(),
        dimension: lut.dimension,
        interpolation: options.interpolation,
    };
    match options.strength {
        Some(strength) if strength > 0.0 && strength < 1.0 => {
            stages.push(FilterStage::Split);
            stages.push(apply);
            stages.push(FilterStage::Blend { opacity: strength });
        }
        _ => stages.push(apply),
    }

    if let Some(output_space) = options.output_color_space {
        if output_space != WORKING_COLOR_SPACE {
            match conversion_filter(WORKING_COLOR_SPACE, output_space) {
                Some(filter) => stages.push(FilterStage::ColorConvert {
                    from: WORKING_COLOR_SPACE,
                    to: output_space,
                    filter,
                }),
                None => notes.push(format!(
                    "no conversion from {} to {}, leaving output in {}",
                    WORKING_COLOR_SPACE, output_space, WORKING_COLOR_SPACE
                )),
            }
        }
    }

    let (video, codec_note) = select_codec(meta);
    notes.extend(codec_note);

    TransformRecipe {
        stages,
        video,
        audio: if meta.has_audio {
            AudioMode::Copy
        } else {
            AudioMode::Disabled
        },
        notes,
    }
}

fn select_codec(meta: &MediaMetadata) -> (CodecParams, Option<String>) {
    // mp4 cannot carry PCM audio, and audio is always stream-copied.
    let pcm_audio = meta
        .audio_codec
        .as_deref()
        .map(|codec| codec.starts_with("pcm_"))
        .unwrap_or(false);
    let default_container = if pcm_audio {
        Container::Mov
    } else {
        Container::Mp4
    };

    let ten_bit = meta
        .pixel_format
        .as_deref()
        .map(|fmt| fmt.contains("10"))
        .unwrap_or(false);

    let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    match meta.video_codec.as_str() {
        "h264" => (
            CodecParams {
                family: CodecFamily::H264,
                args: args(&["-c:v", "libx264", "-preset", "medium", "-crf", "18", "-pix_fmt", "yuv420p"]),
                container: default_container,
            },
            None,
        ),
        "hevc" | "h265" => (
            CodecParams {
                family: CodecFamily::Hevc,
                args: args(&[
                    "-c:v",
                    "libx265",
                    "-preset",
                    "medium",
                    "-crf",
                    "20",
                    "-tag:v",
                    "hvc1",
                    "-pix_fmt",
                    if ten_bit { "yuv420p10le" } else { "yuv420p" },
                ]),
                container: default_container,
            },
            None,
        ),
        "prores" => (
            CodecParams {
                family: CodecFamily::ProRes,
                args: args(&["-c:v", "prores_ks", "-profile:v", "3", "-pix_fmt", "yuv422p10le"]),
                container: Container::Mov,
            },
            None,
        ),
        other => (
            CodecParams {
                family: CodecFamily::H264,
                args: args(&["-c:v", "libx264", "-preset", "medium", "-crf", "20", "-pix_fmt", "yuv420p"]),
                container: default_container,
            },
            Some(format!("unrecognized source codec '{}', encoding H.264", other)),
        ),
    }
}

// Sony S-Log3 (technical summary v1.0).
const SLOG3_CUT_CODE: f64 = 171.2102946929;
const SLOG3_CUT_LINEAR: f64 = 0.01125;

// ARRI LogC3 at EI 800.
const LOGC_CUT: f64 = 0.010591;
const LOGC_A: f64 = 5.555556;
const LOGC_B: f64 = 0.052272;
const LOGC_C: f64 = 0.247190;
const LOGC_D: f64 = 0.385537;
const LOGC_E: f64 = 5.367655;
const LOGC_F: f64 = 0.092809;

const LN_10: f64 = std::f64::consts::LN_10;

// Linear-light primaries matrices, row-major.
const P3D65_TO_REC709: [[f64; 3]; 3] = [
    [1.2249401, -0.2249404, 0.0],
    [-0.0420569, 1.0420571, 0.0],
    [-0.0196376, -0.0786361, 1.0982735],
];
const REC709_TO_P3D65: [[f64; 3]; 3] = [
    [0.8224621, 0.1775380, 0.0],
    [0.0331941, 0.9668058, 0.0],
    [0.0170827, 0.0723974, 0.9105199],
];

/// ffmpeg filter converting `from` into `to`, for the pairs with codified curves.
pub fn conversion_filter(from: ColorSpace, to: ColorSpace) -> Option<String> {
    use ColorSpace::*;

    match (from, to) {
        (SLog3, Rec709) => Some(curve_filter(slog3_decode, rec709_encode)),
        (Rec709, SLog3) => Some(curve_filter(rec709_decode, slog3_encode)),
        (LogC, Rec709) => Some(curve_filter(logc_decode, rec709_encode)),
        (Rec709, LogC) => Some(curve_filter(rec709_decode, logc_encode)),
        (P3D65, Rec709) => Some(channel_mixer(&P3D65_TO_REC709)),
        (Rec709, P3D65) => Some(channel_mixer(&REC709_TO_P3D65)),
        _ => None,
    }
}

fn curve_filter(decode: fn(&str) -> String, encode: fn(&str) -> String) -> String {
    let expr = format!(
        "st(0,{});clip({},0,1)*maxval",
        decode("(val/maxval)"),
        encode("ld(0)")
    );
    let quoted = quote_filter_value(&expr);
    format!("lutrgb=r={q}:g={q}:b={q}", q = quoted)
}

fn channel_mixer(m: &[[f64; 3]; 3]) -> String {
    format!(
        "colorchannelmixer=rr={}:rg={}:rb={}:gr={}:gg={}:gb={}:br={}:bg={}:bb={}",
        m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2]
    )
}

fn slog3_decode(x: &str) -> String {
    format!(
        "if(gte({x}*1023,{cut}),pow(10,({x}*1023-420)/261.5)*0.19-0.01,({x}*1023-95)*{lin}/({cut}-95))",
        x = x,
        cut = SLOG3_CUT_CODE,
        lin = SLOG3_CUT_LINEAR
    )
}

fn slog3_encode(l: &str) -> String {
    format!(
        "if(gte({l},{lin}),(420+log(({l}+0.01)/0.19)/{ln10}*261.5)/1023,({l}*({cut}-95)/{lin}+95)/1023)",
        l = l,
        cut = SLOG3_CUT_CODE,
        lin = SLOG3_CUT_LINEAR,
        ln10 = LN_10
    )
}

fn logc_decode(x: &str) -> String {
    format!(
        "if(gt({x},{ecf}),(pow(10,({x}-{d})/{c})-{b})/{a},({x}-{f})/{e})",
        x = x,
        ecf = LOGC_E * LOGC_CUT + LOGC_F,
        a = LOGC_A,
        b = LOGC_B,
        c = LOGC_C,
        d = LOGC_D,
        e = LOGC_E,
        f = LOGC_F
    )
}

fn logc_encode(l: &str) -> String {
    format!(
        "if(gt({l},{cut}),{c}*log({a}*{l}+{b})/{ln10}+{d},{e}*{l}+{f})",
        l = l,
        cut = LOGC_CUT,
        a = LOGC_A,
        b = LOGC_B,
        c = LOGC_C,
        d = LOGC_D,
        e = LOGC_E,
        f = LOGC_F,
        ln10 = LN_10
    )
}

// BT.709 OETF and its inverse.
fn rec709_encode(l: &str) -> String {
    format!("if(gte({l},0.018),1.099*pow({l},0.45)-0.099,4.5*{l})", l = l)
}

fn rec709_decode(v: &str) -> String {
    format!("if(gte({v},0.081),pow(({v}+0.099)/1.099,1/0.45),{v}/4.5)", v = v)
}

fn quote_filter_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(codec: &str, space: ColorSpace, audio: Option<&str>) -> MediaMetadata {
        MediaMetadata {
            duration_seconds: 10.0,
            video_codec: codec.to_string(),
            width: 1920,
            height: 1080,
            frame_rate: Some(25.0),
            pixel_format: Some("yuv420p".to_string()),
            color_space: space,
            has_audio: audio.is_some(),
            audio_codec: audio.map(String::from),
            format_name: None,
        }
    }

    fn lut() -> LutRef {
        LutRef {
            path: PathBuf::from("/luts/look.cube"),
            dimension: LutDimension::ThreeD,
        }
    }

    fn with_strength(strength: Option<f32>) -> GradeOptions {
        GradeOptions {
            strength,
            ..GradeOptions::default()
        }
    }

    #[test]
    fn full_strength_matches_unset_strength() {
        let source = meta("h264", ColorSpace::Rec709, Some("aac"));
        let unset = build_recipe(&source, &lut(), &with_strength(None));
        let full = build_recipe(&source, &lut(), &with_strength(Some(1.0)));

        assert_eq!(unset.stages, full.stages);
        assert_eq!(unset.stages.len(), 1);
        assert!(!unset.is_blended());
        assert_eq!(
            unset.filter_graph(),
            "[0:v]lut3d=file='/luts/look.cube':interp=trilinear[vout]"
        );
    }

    #[test]
    fn partial_strength_adds_one_split_blend_pair() {
        let source = meta("h264", ColorSpace::Rec709, None);
        let recipe = build_recipe(&source, &lut(), &with_strength(Some(0.5)));

        let splits = recipe.stages.iter().filter(|s| matches!(s, FilterStage::Split)).count();
        let blends = recipe
            .stages
            .iter()
            .filter(|s| matches!(s, FilterStage::Blend { .. }))
            .count();
        assert_eq!((splits, blends), (1, 1));
        assert_eq!(
            recipe.filter_graph(),
            "[0:v]split=2[base0][v0];\
             [v0]lut3d=file='/luts/look.cube':interp=trilinear[v1];\
             [v1][base0]blend=all_mode=normal:all_opacity=0.5[vout]"
        );
    }

    #[test]
    fn log_input_gets_converted_before_the_lut() {
        let source = meta("hevc", ColorSpace::SLog3, Some("aac"));
        let recipe = build_recipe(&source, &lut(), &GradeOptions::default());

        assert!(matches!(
            recipe.stages.first(),
            Some(FilterStage::ColorConvert { from: ColorSpace::SLog3, to: ColorSpace::Rec709, .. })
        ));
        assert!(matches!(recipe.stages.last(), Some(FilterStage::ApplyLut { .. })));
        assert!(recipe.filter_graph().contains("lutrgb=r='st(0,"));
    }

    #[test]
    fn unknown_input_space_passes_through_with_a_note() {
        let source = meta("h264", ColorSpace::Unknown, None);
        let recipe = build_recipe(&source, &lut(), &GradeOptions::default());

        assert_eq!(recipe.stages.len(), 1);
        assert_eq!(recipe.notes.len(), 1);
    }

    #[test]
    fn output_conversion_is_appended_after_the_lut() {
        let source = meta("h264", ColorSpace::Rec709, None);
        let options = GradeOptions {
            output_color_space: Some(ColorSpace::P3D65),
            ..GradeOptions::default()
        };
        let recipe = build_recipe(&source, &lut(), &options);

        assert!(matches!(
            recipe.stages.last(),
            Some(FilterStage::ColorConvert { to: ColorSpace::P3D65, .. })
        ));
        assert!(recipe.filter_graph().contains("colorchannelmixer=rr=0.8224621"));
    }

    #[test]
    fn explicit_input_space_overrides_probe() {
        let source = meta("h264", ColorSpace::Unknown, None);
        let options = GradeOptions {
            input_color_space: Some(ColorSpace::LogC),
            interpolation: Interpolation::Tetrahedral,
            ..GradeOptions::default()
        };
        let recipe = build_recipe(&source, &lut(), &options);

        assert_eq!(recipe.stages.len(), 2);
        assert!(recipe.filter_graph().ends_with("interp=tetrahedral[vout]"));
    }

    #[test]
    fn codec_family_is_preserved() {
        let h264 = build_recipe(&meta("h264", ColorSpace::Rec709, None), &lut(), &GradeOptions::default());
        assert_eq!(h264.video.family, CodecFamily::H264);
        assert_eq!(h264.output_extension(), "mp4");

        let hevc = build_recipe(&meta("hevc", ColorSpace::Rec709, None), &lut(), &GradeOptions::default());
        assert_eq!(hevc.video.family, CodecFamily::Hevc);
        assert!(hevc.video.args.contains(&"libx265".to_string()));

        let prores = build_recipe(&meta("prores", ColorSpace::Rec709, Some("pcm_s24le")), &lut(), &GradeOptions::default());
        assert_eq!(prores.video.family, CodecFamily::ProRes);
        assert_eq!(prores.output_extension(), "mov");

        let vp9 = build_recipe(&meta("vp9", ColorSpace::Rec709, None), &lut(), &GradeOptions::default());
        assert_eq!(vp9.video.family, CodecFamily::H264);
        assert!(vp9.notes.iter().any(|n| n.contains("vp9")));
    }

    #[test]
    fn audio_is_copied_only_when_present() {
        let with_audio = build_recipe(&meta("h264", ColorSpace::Rec709, Some("aac")), &lut(), &GradeOptions::default());
        let args = with_audio.to_args("in.mov", Path::new("/work/out.mp4"));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert_eq!(args.last().map(String::as_str), Some("/work/out.mp4"));

        let silent = build_recipe(&meta("h264", ColorSpace::Rec709, None), &lut(), &GradeOptions::default());
        assert!(silent.to_args("in.mov", Path::new("out.mp4")).contains(&"-an".to_string()));
    }

    #[test]
    fn one_dimensional_luts_use_lut1d() {
        let recipe = build_recipe(
            &meta("h264", ColorSpace::Rec709, None),
            &LutRef {
                path: PathBuf::from("/luts/curve.cube"),
                dimension: LutDimension::OneD,
            },
            &GradeOptions::default(),
        );
        assert!(recipe.filter_graph().contains("lut1d=file='/luts/curve.cube':interp=linear"));
    }
}
