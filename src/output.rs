//! Tab-separated output tables.
//!
//! Every table starts with a header line. Time series tables share the
//! `onset duration <variable>` layout, with one row per grid point, so that tables of
//! different modalities produced with the same step can be joined on `onset`.

use std::fmt::Display;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::audio::AudioRun;
use crate::hash::BitHash;
use crate::video::VisualRun;
use crate::{diff, Error, Result};

pub const MEAN_VARIABLE: &str = "brmean";
pub const VERTICAL_DIFF_VARIABLE: &str = "brud";
pub const HORIZONTAL_DIFF_VARIABLE: &str = "brlr";
pub const PHASH_VARIABLE: &str = "phash";
pub const MD5_VARIABLE: &str = "md5sum";
pub const NORM_DIFF_VARIABLE: &str = "norm_diff";
pub const RMS_VARIABLE: &str = "rms";
pub const LR_DIFF_VARIABLE: &str = "lrdiff";

const PHASH_SUFFIX: &str = "_phash";
const NORM_DIFF_SUFFIX: &str = "_normdiff";
const FRAME_HASHES_SUFFIX: &str = "_frame-hashes";
const QUADRANTS_SUFFIX: &str = "_quadrants";

/// Formats an onset with two decimals.
#[inline]
pub fn format_onset(t: f64) -> String {
    format!("{:.2}", t)
}

/// Formats a float the way Python's `repr` does: integral values keep a trailing `.0`,
/// everything else uses the shortest representation that round-trips.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Builds `<out_dir>/<input stem><suffix>.tsv`.
pub fn output_path(out_dir: impl AsRef<Path>, input: impl AsRef<Path>, suffix: &str) -> PathBuf {
    let stem = input
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    out_dir.as_ref().join(format!("{}{}.tsv", stem, suffix))
}

/// Writes rows of tab-separated fields.
pub struct TsvWriter<W: Write> {
    inner: W,
}

impl<W: Write> TsvWriter<W> {
    /// Wraps `inner` and writes the header line.
    pub fn new(inner: W, header: &[&str]) -> Result<Self> {
        let mut writer = Self { inner };
        writer.write_row(header)?;
        Ok(writer)
    }

    pub fn write_row<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.inner.write_all(b"\t")?;
            }
            write!(self.inner, "{}", field)?;
        }
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Writes an `onset duration <variable>` table. Row `i` has onset `i * step`.
pub fn write_onset_table<W, I>(out: W, variable: &str, step: f64, values: I) -> Result<W>
where
    W: Write,
    I: IntoIterator<Item = String>,
{
    let mut writer = TsvWriter::new(out, &["onset", "duration", variable])?;
    for (i, value) in values.into_iter().enumerate() {
        writer.write_row([format_onset(i as f64 * step), step.to_string(), value])?;
    }
    writer.finish()
}

fn create(path: &Path) -> Result<BufWriter<std::fs::File>> {
    Ok(BufWriter::new(std::fs::File::create(path)?))
}

/// Writes the per-variable visual tables (`brmean`, `brud`, `brlr`, `phash`, `md5sum`)
/// and the perceptual difference table for `input` into `out_dir`.
///
/// Rows are labelled with the run's label step. Returns the written paths.
pub fn write_visual_tables(
    run: &VisualRun,
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let (input, out_dir) = (input.as_ref(), out_dir.as_ref());
    let step = run.label_step;
    let records = &run.records;

    let tables: [(&str, Vec<String>); 5] = [
        (
            MEAN_VARIABLE,
            records
                .iter()
                .map(|r| format_float(r.features.quadrants.mean()))
                .collect(),
        ),
        (
            VERTICAL_DIFF_VARIABLE,
            records
                .iter()
                .map(|r| r.features.quadrants.vertical_diff().to_string())
                .collect(),
        ),
        (
            HORIZONTAL_DIFF_VARIABLE,
            records
                .iter()
                .map(|r| r.features.quadrants.horizontal_diff().to_string())
                .collect(),
        ),
        (
            PHASH_VARIABLE,
            records
                .iter()
                .map(|r| r.features.hashes.phash.to_hex())
                .collect(),
        ),
        (
            MD5_VARIABLE,
            records
                .iter()
                .map(|r| r.features.hashes.md5.clone())
                .collect(),
        ),
    ];

    let mut paths = Vec::with_capacity(tables.len() + 1);
    for (variable, values) in tables {
        let path = output_path(out_dir, input, &format!("_{}", variable));
        write_onset_table(create(&path)?, variable, step, values)?;
        tracing::debug!(path = %path.display(), "wrote table");
        paths.push(path);
    }

    let path = output_path(out_dir, input, NORM_DIFF_SUFFIX);
    write_norm_diff_table(create(&path)?, step, &run.perceptual_diff()?)?;
    tracing::debug!(path = %path.display(), "wrote table");
    paths.push(path);

    Ok(paths)
}

/// Writes an `onset duration norm_diff` table with six decimals.
pub fn write_norm_diff_table<W: Write>(out: W, step: f64, series: &[f64]) -> Result<W> {
    write_onset_table(
        out,
        NORM_DIFF_VARIABLE,
        step,
        series.iter().map(|d| format!("{:.6}", d)),
    )
}

/// Writes the `movie_time ul ur ll lr` table, labelled with the sampling time.
pub fn write_quadrant_table<W: Write>(out: W, run: &VisualRun) -> Result<W> {
    let mut writer = TsvWriter::new(out, &["movie_time", "ul", "ur", "ll", "lr"])?;
    for r in &run.records {
        let q = &r.features.quadrants;
        writer.write_row([
            format_onset(r.time),
            q.upper_left.to_string(),
            q.upper_right.to_string(),
            q.lower_left.to_string(),
            q.lower_right.to_string(),
        ])?;
    }
    writer.finish()
}

/// Writes the `frame_idx movie_time phash md5sum` table, labelled with the sampling time.
pub fn write_frame_hash_table<W: Write>(out: W, run: &VisualRun) -> Result<W> {
    let mut writer = TsvWriter::new(out, &["frame_idx", "movie_time", "phash", "md5sum"])?;
    for r in &run.records {
        writer.write_row([
            r.index.to_string(),
            format_onset(r.time),
            r.features.hashes.phash.to_hex(),
            r.features.hashes.md5.clone(),
        ])?;
    }
    writer.finish()
}

/// Writes the quadrant table for `input` into `out_dir`.
pub fn write_quadrant_file(
    run: &VisualRun,
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let path = output_path(out_dir, input, QUADRANTS_SUFFIX);
    write_quadrant_table(create(&path)?, run)?;
    Ok(path)
}

/// Writes the frame hash table for `input` into `out_dir`.
pub fn write_frame_hash_file(
    run: &VisualRun,
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let path = output_path(out_dir, input, FRAME_HASHES_SUFFIX);
    write_frame_hash_table(create(&path)?, run)?;
    Ok(path)
}

/// Writes the `rms` and `lrdiff` tables for `input` into `out_dir`.
pub fn write_audio_tables(
    run: &AudioRun,
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let (input, out_dir) = (input.as_ref(), out_dir.as_ref());

    let rms = run
        .records
        .iter()
        .map(|r| format!("{:.8}", r.features.rms_sum()));
    let rms_path = output_path(out_dir, input, &format!("_{}", RMS_VARIABLE));
    write_onset_table(create(&rms_path)?, RMS_VARIABLE, run.step, rms)?;

    let lr_diff: Vec<String> = run
        .records
        .iter()
        .map(|r| {
            r.features
                .lr_diff
                .map(|d| format!("{:.8}", d))
                .ok_or(Error::ChannelCountError {
                    expected: 2,
                    found: r.features.rms.len(),
                })
        })
        .collect::<Result<_>>()?;
    let lr_diff_path = output_path(out_dir, input, &format!("_{}", LR_DIFF_VARIABLE));
    write_onset_table(create(&lr_diff_path)?, LR_DIFF_VARIABLE, run.step, lr_diff)?;

    Ok(vec![rms_path, lr_diff_path])
}

/// A parsed `onset duration <variable>` table.
#[derive(Clone, Debug, PartialEq)]
pub struct OnsetTable {
    pub variable: String,
    pub onsets: Vec<f64>,
    pub durations: Vec<f64>,
    pub values: Vec<String>,
}

/// Reads an `onset duration <variable>` table.
pub fn read_onset_table(reader: impl BufRead) -> Result<OnsetTable> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or_else(|| Error::MalformedTable {
        line: 1,
        reason: "missing header".to_owned(),
    })??;
    let columns: Vec<&str> = header.trim_end().split('\t').collect();
    if columns.len() != 3 || columns[0] != "onset" || columns[1] != "duration" {
        return Err(Error::MalformedTable {
            line: 1,
            reason: format!("expected 'onset duration <variable>', got {:?}", header),
        });
    }

    let mut table = OnsetTable {
        variable: columns[2].to_owned(),
        onsets: Vec::new(),
        durations: Vec::new(),
        values: Vec::new(),
    };

    for (i, line) in lines.enumerate() {
        let line = line?;
        let line_no = i + 2;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != 3 {
            return Err(Error::MalformedTable {
                line: line_no,
                reason: format!("expected 3 fields, found {}", fields.len()),
            });
        }
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|e| Error::MalformedTable {
                line: line_no,
                reason: format!("{:?}: {}", s, e),
            })
        };
        table.onsets.push(parse(fields[0])?);
        table.durations.push(parse(fields[1])?);
        table.values.push(fields[2].to_owned());
    }

    Ok(table)
}

/// Path of the perceptual difference table derived from a phash table: `_phash` in
/// the file name is replaced by `_normdiff`.
pub fn norm_diff_path_for(phash_path: impl AsRef<Path>) -> PathBuf {
    let path = phash_path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match stem.strip_suffix(PHASH_SUFFIX) {
        Some(base) => format!("{}{}", base, NORM_DIFF_SUFFIX),
        None => format!("{}{}", stem, NORM_DIFF_SUFFIX),
    };
    path.with_file_name(format!("{}.tsv", stem))
}

/// Recomputes the perceptual difference table from an existing phash table.
///
/// The output keeps the onsets and durations of the input rows.
pub fn diff_phash_table<R: BufRead, W: Write>(reader: R, out: W) -> Result<W> {
    let table = read_onset_table(reader)?;
    if table.variable != PHASH_VARIABLE {
        return Err(Error::MalformedTable {
            line: 1,
            reason: format!("expected a '{}' column, got {:?}", PHASH_VARIABLE, table.variable),
        });
    }

    let hashes = table
        .values
        .iter()
        .map(|v| v.parse::<BitHash>())
        .collect::<Result<Vec<_>>>()?;
    let series = diff::aligned_series(&hashes)?;

    let mut writer = TsvWriter::new(out, &["onset", "duration", NORM_DIFF_VARIABLE])?;
    for ((onset, duration), d) in table.onsets.iter().zip(&table.durations).zip(series) {
        writer.write_row([format_onset(*onset), duration.to_string(), format!("{:.6}", d)])?;
    }
    writer.finish()
}

/// File-based wrapper around [diff_phash_table]. Returns the written path.
pub fn diff_phash_file(phash_path: impl AsRef<Path>) -> Result<PathBuf> {
    let phash_path = phash_path.as_ref();
    let out_path = norm_diff_path_for(phash_path);
    let reader = std::io::BufReader::new(std::fs::File::open(phash_path)?);
    diff_phash_table(reader, create(&out_path)?)?;
    Ok(out_path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::{AudioFeatures, AudioRecord};
    use crate::video::{FrameHashes, QuadrantFeatures, VisualFeatures, VisualRecord};

    fn visual_run() -> VisualRun {
        let record = |index: usize, q: QuadrantFeatures, byte: u8| VisualRecord {
            index,
            time: index as f64 / 25.0,
            features: VisualFeatures {
                quadrants: q,
                hashes: FrameHashes {
                    md5: format!("{:032x}", index),
                    phash: BitHash::from_bytes(vec![byte; 18]),
                },
            },
        };
        VisualRun {
            sample_step: 1.0 / 25.0,
            label_step: 0.04,
            records: vec![
                record(0, QuadrantFeatures::new(100, 100, 50, 50), 0xF0),
                record(1, QuadrantFeatures::new(10, 20, 30, 41), 0x0F),
                record(2, QuadrantFeatures::new(10, 20, 30, 41), 0x0F),
            ],
        }
    }

    fn to_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(75.0), "75.0");
        assert_eq!(format_float(25.25), "25.25");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path("out", "stimuli/fg_av_ger_seg0.mkv", "_brmean"),
            PathBuf::from("out/fg_av_ger_seg0_brmean.tsv")
        );
        assert_eq!(
            norm_diff_path_for("out/fg_av_ger_seg0_phash.tsv"),
            PathBuf::from("out/fg_av_ger_seg0_normdiff.tsv")
        );
        assert_eq!(
            norm_diff_path_for("out/hashes.tsv"),
            PathBuf::from("out/hashes_normdiff.tsv")
        );
    }

    #[test]
    fn test_onset_table() {
        let run = visual_run();
        let out = write_onset_table(
            Vec::new(),
            MEAN_VARIABLE,
            run.label_step,
            run.records
                .iter()
                .map(|r| format_float(r.features.quadrants.mean())),
        )
        .unwrap();
        insta::assert_snapshot!(to_string(out), @r###"
onset	duration	brmean
0.00	0.04	75.0
0.04	0.04	25.25
0.08	0.04	25.25
"###);
    }

    #[test]
    fn test_norm_diff_table() {
        let run = visual_run();
        let out = write_norm_diff_table(Vec::new(), 0.04, &run.perceptual_diff().unwrap()).unwrap();
        insta::assert_snapshot!(to_string(out), @r###"
onset	duration	norm_diff
0.00	0.04	0.000000
0.04	0.04	1.000000
0.08	0.04	0.000000
"###);
    }

    #[test]
    fn test_quadrant_and_frame_hash_tables() {
        let run = visual_run();
        let out = write_quadrant_table(Vec::new(), &run).unwrap();
        insta::assert_snapshot!(to_string(out), @r###"
movie_time	ul	ur	ll	lr
0.00	100	100	50	50
0.04	10	20	30	41
0.08	10	20	30	41
"###);

        let out = to_string(write_frame_hash_table(Vec::new(), &run).unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "frame_idx\tmovie_time\tphash\tmd5sum");
        assert_eq!(
            lines[1],
            format!("0\t0.00\t{}\t{:032x}", "f0".repeat(18), 0)
        );
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_visual_tables_on_disk() {
        let dir = std::env::temp_dir().join(format!("confound-visual-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let paths = write_visual_tables(&visual_run(), "movie.mkv", &dir).unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "movie_brmean.tsv",
                "movie_brud.tsv",
                "movie_brlr.tsv",
                "movie_phash.tsv",
                "movie_md5sum.tsv",
                "movie_normdiff.tsv",
            ]
        );

        let brud = std::fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(brud, "onset\tduration\tbrud\n0.00\t0.04\t100\n0.04\t0.04\t-41\n0.08\t0.04\t-41\n");

        // Recomputing the difference from the phash table gives the same output.
        let recomputed = diff_phash_file(&paths[3]).unwrap();
        assert_eq!(recomputed, paths[5]);
        let normdiff = std::fs::read_to_string(&paths[5]).unwrap();
        assert_eq!(
            normdiff,
            "onset\tduration\tnorm_diff\n0.00\t0.04\t0.000000\n0.04\t0.04\t1.000000\n0.08\t0.04\t0.000000\n"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_audio_tables_on_disk() {
        let dir = std::env::temp_dir().join(format!("confound-audio-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let run = AudioRun {
            step: 0.04,
            records: vec![
                AudioRecord {
                    index: 0,
                    onset: 0.0,
                    features: AudioFeatures {
                        rms: vec![0.0, 0.0],
                        lr_diff: Some(0.0),
                    },
                },
                AudioRecord {
                    index: 1,
                    onset: 0.04,
                    features: AudioFeatures {
                        rms: vec![0.25, 0.125],
                        lr_diff: Some(-0.125),
                    },
                },
            ],
        };
        let paths = write_audio_tables(&run, "movie.mkv", &dir).unwrap();

        let rms = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(rms, "onset\tduration\trms\n0.00\t0.04\t0.00000000\n0.04\t0.04\t0.37500000\n");
        let lr_diff = std::fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(
            lr_diff,
            "onset\tduration\tlrdiff\n0.00\t0.04\t0.00000000\n0.04\t0.04\t-0.12500000\n"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_onset_table_errors() {
        let bad_header = "time\tvalue\n0.00\t1\n";
        assert!(matches!(
            read_onset_table(bad_header.as_bytes()),
            Err(Error::MalformedTable { line: 1, .. })
        ));

        let bad_row = "onset\tduration\tphash\n0.00\t0.04\tff\nnope\t0.04\tff\n";
        assert!(matches!(
            read_onset_table(bad_row.as_bytes()),
            Err(Error::MalformedTable { line: 3, .. })
        ));

        let wrong_variable = "onset\tduration\tmd5sum\n0.00\t0.04\tff\n";
        assert!(matches!(
            diff_phash_table(wrong_variable.as_bytes(), Vec::new()),
            Err(Error::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_diff_phash_table_single_row() {
        let input = format!("onset\tduration\tphash\n0.00\t0.04\t{}\n", "ab".repeat(18));
        let out = diff_phash_table(input.as_bytes(), Vec::new()).unwrap();
        assert_eq!(
            to_string(out),
            "onset\tduration\tnorm_diff\n0.00\t0.04\t0.000000\n"
        );
    }
}
