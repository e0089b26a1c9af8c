use std::{
    ffi::{OsStr, OsString},
    path::Path,
};

use crate::params::ParameterSpec;

/// Raw pixel data (`-r`) versus the packaged `.glraw` container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputMode {
    Raw,
    Packaged,
}

impl OutputMode {
    pub fn is_raw(&self) -> bool {
        matches!(self, OutputMode::Raw)
    }
}

/// Builds the `glraw-cmd` argument vector for one input file.
///
/// Order is fixed: output directory, raw switch, options, input path last.
/// Booleans are emitted only when set, scales only when they differ from
/// `1.0`, dimensions and the compressed format only when present. Format,
/// type, aspect-ratio and transform mode always carry a value and are always
/// emitted.
pub fn build_args(
    input: &Path,
    result_dir: &Path,
    mode: OutputMode,
    spec: &ParameterSpec,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(24);
    push_option(&mut args, "-o", result_dir);
    if mode.is_raw() {
        args.push("-r".into());
    }
    if spec.no_suffixes() {
        args.push("--no-suffixes".into());
    }
    push_option(&mut args, "--format", spec.format().token());
    push_option(&mut args, "--type", spec.pixel_type().token());
    if let Some(compressed) = spec.compressed_format() {
        push_option(&mut args, "--compressed-format", compressed.token());
    }
    if spec.mirror_vertical() {
        args.push("--mirror-vertical".into());
    }
    if spec.mirror_horizontal() {
        args.push("--mirror-horizontal".into());
    }
    for (flag, value) in [
        ("--scale", spec.scale()),
        ("--width-scale", spec.width_scale()),
        ("--height-scale", spec.height_scale()),
    ] {
        if value != 1.0 {
            push_option(&mut args, flag, value.to_string());
        }
    }
    if let Some(width) = spec.width() {
        push_option(&mut args, "--width", width.to_string());
    }
    if let Some(height) = spec.height() {
        push_option(&mut args, "--height", height.to_string());
    }
    push_option(&mut args, "--aspect-ratio", spec.aspect_ratio_mode().token());
    push_option(&mut args, "--transform-mode", spec.transform_mode().token());

    args.push(input.as_os_str().to_owned());
    args
}

fn push_option(args: &mut Vec<OsString>, flag: &str, value: impl AsRef<OsStr>) {
    args.push(flag.into());
    args.push(value.as_ref().to_owned());
}
