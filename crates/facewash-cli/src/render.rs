use facewash_core::PerFaceResult;
use image::{imageops, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Gap between the two halves of a comparison image.
const COMPARE_GAP: u32 = 8;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Files written for one face.
#[derive(Debug, Clone)]
pub struct RenderedFace {
    pub original: PathBuf,
    pub result: PathBuf,
    pub compare: PathBuf,
}

/// Original on the left, output on the right, top-aligned on white.
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width() + COMPARE_GAP + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
    imageops::overlay(&mut canvas, left, 0, 0);
    imageops::overlay(&mut canvas, right, i64::from(left.width() + COMPARE_GAP), 0);
    canvas
}

/// `<stem>[_<tag>]_face<N>` for a face in `source`. `N` counts from 1.
pub fn face_prefix(source: &Path, tag: Option<&str>, index: usize) -> String {
    let number = index + 1;
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    match tag {
        Some(tag) => format!("{stem}_{tag}_face{number}"),
        None => format!("{stem}_face{number}"),
    }
}

/// Write original, result and side-by-side PNGs for a face.
pub fn write_face(
    out_dir: &Path,
    source: &Path,
    tag: Option<&str>,
    face: &PerFaceResult,
) -> image::ImageResult<RenderedFace> {
    let prefix = face_prefix(source, tag, face.index);
    let rendered = RenderedFace {
        original: out_dir.join(format!("{prefix}_original.png")),
        result: out_dir.join(format!("{prefix}_result.png")),
        compare: out_dir.join(format!("{prefix}_compare.png")),
    };

    face.original.save(&rendered.original)?;
    face.output.save(&rendered.result)?;
    side_by_side(&face.original, &face.output).save(&rendered.compare)?;

    tracing::debug!(path = %rendered.compare.display(), "face written");
    Ok(rendered)
}
