use std::env;
use std::path::{Path, PathBuf};

/// Libraries the transcoder links against, as vcpkg names their import libs.
const REQUIRED_LIBRARIES: [&str; 4] = ["avcodec", "avformat", "avutil", "swresample"];

fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=FFMPEG_DIR is not set. On Windows, install FFmpeg (with swresample) via vcpkg and set VCPKG_ROOT + FFMPEG_DIR."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);

    if !ffmpeg_dir.exists() {
        println!(
            "cargo:warning=VCPKG_ROOT is set but no FFmpeg install was found at {}.",
            ffmpeg_dir.display(),
        );
        return;
    }

    println!(
        "cargo:warning=Detected vcpkg FFmpeg at {}. Set FFMPEG_DIR={} to make ffmpeg-sys-next discovery explicit.",
        ffmpeg_dir.display(),
        ffmpeg_dir.display(),
    );
    for library in missing_libraries(&ffmpeg_dir) {
        println!(
            "cargo:warning=vcpkg FFmpeg at {} has no {library}.lib; audio conversion needs it.",
            ffmpeg_dir.display(),
        );
    }
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!(
            "cargo:warning=Consider setting VCPKGRS_DYNAMIC=1 when using vcpkg dynamic FFmpeg builds on Windows."
        );
    }
}

fn missing_libraries(ffmpeg_dir: &Path) -> Vec<&'static str> {
    let lib_dir = ffmpeg_dir.join("lib");
    REQUIRED_LIBRARIES
        .into_iter()
        .filter(|library| !lib_dir.join(format!("{library}.lib")).exists())
        .collect()
}
