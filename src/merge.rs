use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::BundleOptions;
use crate::error::{BookError, ToolError};
use crate::plan::ProcessingPlan;

/// Drive the external tooling for one planned book: stage the sources, emit
/// the per-part manifest and chapter metadata, merge each part with ffmpeg,
/// then attach cover art and the audiobook library tag to every output.
///
/// Returns the produced output files. Any tool failure aborts this book only;
/// the caller logs it and moves on to the next book.
pub fn process_book(plan: &ProcessingPlan, options: &BundleOptions) -> Result<Vec<PathBuf>, BookError> {
    let work_dir = options.work_dir.as_path();
    stage_book(plan, work_dir)?;
    write_part_files(plan, work_dir, &options.chapter_prefix)?;
    let cover = extract_cover(plan, work_dir)?;

    let target_dir = options
        .target_dir
        .join(sanitize_component(&plan.author))
        .join(sanitize_component(&plan.book));
    fs::create_dir_all(&target_dir).map_err(|e| BookError::Io {
        path: target_dir.clone(),
        source: e,
    })?;

    let mut outputs = Vec::with_capacity(plan.parts);
    for part in 1..=plan.parts {
        outputs.push(merge_part(plan, part, work_dir, &target_dir)?);
    }
    for output in &outputs {
        attach_cover(&cover, output)?;
        mark_as_audiobook(output)?;
    }
    info!("{}: {} completed", plan.author, plan.book);
    Ok(outputs)
}

/// Wipe and rebuild the staging directory, then symlink every ordered track
/// to a numbered name (`0.m4a`, `1.m4a`, ...) matching its play position.
fn stage_book(plan: &ProcessingPlan, work_dir: &Path) -> Result<(), BookError> {
    if work_dir.exists() {
        fs::remove_dir_all(work_dir).map_err(|e| staging(work_dir, e))?;
    }
    fs::create_dir_all(work_dir).map_err(|e| staging(work_dir, e))?;

    for (index, planned) in plan.tracks.iter().enumerate() {
        let source = fs::canonicalize(&planned.track.path)
            .map_err(|e| staging(&planned.track.path, e))?;
        let link = work_dir.join(format!("{index}.m4a"));
        std::os::unix::fs::symlink(&source, &link).map_err(|e| staging(&link, e))?;
    }
    Ok(())
}

fn staging(path: &Path, source: std::io::Error) -> BookError {
    BookError::Staging {
        path: path.to_path_buf(),
        source,
    }
}

/// Emit the concat manifest and the ffmetadata file for every part.
fn write_part_files(
    plan: &ProcessingPlan,
    work_dir: &Path,
    chapter_prefix: &str,
) -> Result<(), BookError> {
    for part in 1..=plan.parts {
        let manifest = work_dir.join(format!("filelist_part_{part}.txt"));
        fs::write(&manifest, manifest_text(plan, part)).map_err(|e| BookError::Io {
            path: manifest,
            source: e,
        })?;

        let metadata = work_dir.join(format!("metadata_part_{part}.txt"));
        fs::write(&metadata, metadata_text(plan, part, chapter_prefix)).map_err(|e| {
            BookError::Io {
                path: metadata,
                source: e,
            }
        })?;
    }
    Ok(())
}

/// Concat-demuxer manifest: one staged filename per track of this part, in
/// play order. Indices are global across the whole book so they match the
/// staged symlink names.
fn manifest_text(plan: &ProcessingPlan, part: usize) -> String {
    let mut text = String::new();
    for (index, planned) in plan.tracks.iter().enumerate() {
        if planned.part == part {
            text.push_str(&format!("file '{index}.m4a'\n"));
        }
    }
    text
}

/// ffmetadata file for one part: flat key=value header carrying the
/// book-level tags, then one chapter block per track of the part. Chapter
/// numbering runs across the whole book, not per part.
fn metadata_text(plan: &ProcessingPlan, part: usize, chapter_prefix: &str) -> String {
    let comment = plan
        .tracks
        .first()
        .map(|p| p.track.comment.as_str())
        .unwrap_or_default();

    let mut text = String::from(";FFMETADATA1\n");
    text.push_str("major_brand=M4A\n");
    text.push_str("minor_version=0\n");
    text.push_str("compatible_brands=M4A mp42isom\n");
    text.push_str(&format!("comment={}\n", escape_metadata(comment)));
    text.push_str(&format!("artist={}\n", escape_metadata(&plan.author)));
    text.push_str("mediatype=2\n");
    text.push_str(&format!("album={}\n", escape_metadata(&plan.book)));
    text.push_str("Encoding Params=vers\n");
    text.push_str(&format!(
        "title={} Part {part}\n",
        escape_metadata(&plan.book)
    ));

    for (index, planned) in plan.tracks.iter().enumerate() {
        if planned.part != part {
            continue;
        }
        text.push_str("[CHAPTER]\n");
        text.push_str("TIMEBASE=1/1000\n");
        text.push_str(&format!("START={}\n", planned.chapter_start_ms));
        text.push_str(&format!("END={}\n", planned.chapter_end_ms));
        text.push_str(&format!("title={}{}\n", chapter_prefix, index + 1));
    }
    text
}

/// The ffmetadata format gives `=`, `;`, `#`, `\` and newline special
/// meaning inside values; they must be backslash-escaped.
fn escape_metadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Extract the embedded cover image from the first ordered track, once per
/// book. mp4art writes the image next to its input, so the track is copied
/// into the staging directory first; the produced filename depends on the
/// image format, hence the prefix search afterwards.
fn extract_cover(plan: &ProcessingPlan, work_dir: &Path) -> Result<PathBuf, BookError> {
    let Some(first) = plan.tracks.first() else {
        return Err(staging(work_dir, std::io::Error::other("empty plan")));
    };
    let staged = work_dir.join("cover_source.m4a");
    fs::copy(&first.track.path, &staged).map_err(|e| staging(&staged, e))?;

    run_tool(
        "mp4art",
        Command::new("mp4art")
            .args(["--extract", "--art-index", "0"])
            .arg(&staged),
    )?;

    for entry in fs::read_dir(work_dir).map_err(|e| staging(work_dir, e))?.flatten() {
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with("cover_source.art")
        {
            debug!("extracted cover image {:?}", entry.path());
            return Ok(entry.path());
        }
    }
    Err(staging(
        work_dir,
        std::io::Error::new(std::io::ErrorKind::NotFound, "no cover art produced"),
    ))
}

/// Merge one part with ffmpeg. The output lands under a `.tmp` name first and
/// is renamed into place on success, so an interrupted or failed merge never
/// leaves a partial file in the target tree.
fn merge_part(
    plan: &ProcessingPlan,
    part: usize,
    work_dir: &Path,
    target_dir: &Path,
) -> Result<PathBuf, BookError> {
    let final_path = target_dir.join(part_file_name(&plan.book, plan.parts, part));
    let tmp_path = target_dir.join(format!(
        "{}.tmp",
        part_file_name(&plan.book, plan.parts, part)
    ));

    info!("starting to join {:?}", final_path.file_name().unwrap_or_default());
    run_tool(
        "ffmpeg",
        Command::new("ffmpeg")
            .args(["-f", "concat", "-y", "-safe", "1", "-i"])
            .arg(work_dir.join(format!("filelist_part_{part}.txt")))
            .arg("-i")
            .arg(work_dir.join(format!("metadata_part_{part}.txt")))
            .args(["-map_metadata", "1", "-vn", "-c:a", "copy"])
            .args(["-movflags", "faststart"])
            // the .tmp name hides the extension, so the muxer is explicit
            .args(["-f", "ipod"])
            .arg(&tmp_path),
    )?;

    fs::rename(&tmp_path, &final_path).map_err(|e| BookError::Io {
        path: final_path.clone(),
        source: e,
    })?;
    info!("created target audio file {:?}", final_path);
    Ok(final_path)
}

fn attach_cover(cover: &Path, output: &Path) -> Result<(), BookError> {
    run_tool(
        "mp4art",
        Command::new("mp4art").arg("--add").arg(cover).arg(output),
    )?;
    debug!("attached cover image to {:?}", output);
    Ok(())
}

fn mark_as_audiobook(output: &Path) -> Result<(), BookError> {
    run_tool(
        "mp4tags",
        Command::new("mp4tags").args(["-i", "Audiobook"]).arg(output),
    )?;
    debug!("marked {:?} as audiobook", output);
    Ok(())
}

fn run_tool(tool: &'static str, cmd: &mut Command) -> Result<(), ToolError> {
    debug!("running {:?}", cmd);
    let status = cmd
        .status()
        .map_err(|source| ToolError::Spawn { tool, source })?;
    if !status.success() {
        return Err(ToolError::Failed { tool, status });
    }
    Ok(())
}

/// Output file name: `<book>.m4a` for a single-part book,
/// `<book>_part_<N>.m4a` when the book splits.
fn part_file_name(book: &str, parts: usize, part: usize) -> String {
    let book = sanitize_component(book);
    if parts > 1 {
        format!("{book}_part_{part}.m4a")
    } else {
        format!("{book}.m4a")
    }
}

/// Tag values become path components; path separators in them would change
/// the directory layout.
fn sanitize_component(value: &str) -> String {
    let cleaned = value.replace(['/', '\\'], "-");
    if cleaned.trim().is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
