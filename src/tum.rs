//! TUM trajectory text format: `timestamp tx ty tz qx qy qz qw` per line.
//!
//! Only used by the binaries; the evaluation core works on validated
//! `PoseSequence`s and never touches files.

use anyhow::{bail, Context};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::types::{Pose, PoseSequence, QUATERNION_NORM_TOLERANCE};

/// Parse TUM text. Blank lines and `#` comments are skipped.
pub fn parse_tum(name: &str, text: &str) -> anyhow::Result<PoseSequence> {
    let mut poses = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::parse::<f64>)
            .collect::<Result<Vec<f64>, _>>()
            .with_context(|| format!("{}:{}: invalid number", name, line_no + 1))?;
        if values.len() != 8 {
            bail!(
                "{}:{}: expected 8 columns (timestamp tx ty tz qx qy qz qw), found {}",
                name,
                line_no + 1,
                values.len()
            );
        }

        let (qx, qy, qz, qw) = (values[4], values[5], values[6], values[7]);
        let norm = (qx * qx + qy * qy + qz * qz + qw * qw).sqrt();
        if (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
            bail!("{}:{}: quaternion norm {} is not 1", name, line_no + 1, norm);
        }
        poses.push(Pose::from_xyz_quat_wxyz(
            values[0],
            [values[1], values[2], values[3]],
            [qw, qx, qy, qz],
        ));
    }
    log::debug!("Loaded {} poses from {}", poses.len(), name);
    Ok(PoseSequence::new(name, poses)?)
}

/// Read a TUM file, gunzipping `.gz` files.
pub fn read_tum(path: &Path) -> anyhow::Result<PoseSequence> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut text = String::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        GzDecoder::new(file).read_to_string(&mut text)?;
    } else {
        let mut file = file;
        file.read_to_string(&mut text)?;
    }
    parse_tum(&path.display().to_string(), &text)
}

pub fn format_tum(sequence: &PoseSequence) -> String {
    let mut out = String::new();
    for pose in sequence.poses() {
        let t = &pose.translation;
        let q = pose.rotation.quaternion();
        out.push_str(&format!(
            "{} {} {} {} {} {} {} {}\n",
            pose.timestamp, t.x, t.y, t.z, q.i, q.j, q.k, q.w
        ));
    }
    out
}

pub fn write_tum(path: &Path, sequence: &PoseSequence) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(format_tum(sequence).as_bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = "# timestamp tx ty tz qx qy qz qw\n\
        1305031102.175304 1.3405 0.6266 1.6575 0.6574 0.6126 -0.2949 -0.3248\n\
        \n\
        1305031102.211214 1.3303 0.6256 1.6464 0.6579 0.6161 -0.2932 -0.3189\n";

    #[test]
    fn test_parse_sample() {
        let seq = parse_tum("sample", SAMPLE).unwrap();
        assert_eq!(seq.len(), 2);
        assert_relative_eq!(seq.poses()[0].translation.x, 1.3405);
        assert_relative_eq!(seq.poses()[1].timestamp, 1305031102.211214);
    }

    #[test]
    fn test_rejects_bad_rows() {
        assert!(parse_tum("short", "1.0 2.0 3.0\n").is_err());
        assert!(parse_tum("nan", "1.0 0 0 0 0 0 0 abc\n").is_err());
        let err = parse_tum("scaled", "1.0 0 0 0 0 0 0 2.0\n").unwrap_err();
        assert!(err.to_string().contains("norm"));
        assert!(parse_tum("order", "2.0 0 0 0 0 0 0 1\n1.0 0 0 0 0 0 0 1\n").is_err());
    }

    #[test]
    fn test_format_parse_roundtrip() {
        let seq = parse_tum("sample", SAMPLE).unwrap();
        let back = parse_tum("sample", &format_tum(&seq)).unwrap();
        assert_eq!(back.timestamps(), seq.timestamps());
        for (a, b) in seq.poses().iter().zip(back.poses()) {
            assert_relative_eq!(a.translation, b.translation, epsilon = 1e-12);
            assert_relative_eq!(a.rotation.angle_to(&b.rotation), 0.0, epsilon = 1e-9);
        }
    }
}
