//! Plain-text particle snapshots
//!
//! One header block followed by one row per particle, in particle order:
//!
//! ```text
//! # t = 3.945
//! # center-of-mass = x, y, z
//! # center-of-momentum = vx, vy, vz
//! # id x y z vx vy vz m
//! 0 ...
//! ```
//!
//! With [`SnapshotFormat::Lbr`] the position columns are heliocentric
//! `l b r` (degrees, degrees, distance). Velocities are always galactocentric
//! Cartesian.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::simulation::coordinates::cartesian_to_lbr;
use crate::simulation::states::System3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapshotFormat {
    Cartesian,
    Lbr { sun_gc_dist: f64 },
}

impl SnapshotFormat {
    pub fn new(cartesian: bool, sun_gc_dist: f64) -> Self {
        if cartesian {
            SnapshotFormat::Cartesian
        } else {
            SnapshotFormat::Lbr { sun_gc_dist }
        }
    }

    fn columns(&self) -> &'static str {
        match self {
            SnapshotFormat::Cartesian => "# id x y z vx vy vz m",
            SnapshotFormat::Lbr { .. } => "# id l b r vx vy vz m",
        }
    }
}

/// Write one snapshot of `sys` to `out`
pub fn write_snapshot<W: Write>(out: &mut W, sys: &System3, format: SnapshotFormat) -> io::Result<()> {
    let com = sys.center_of_mass();
    let vcom = sys.center_of_momentum();

    writeln!(out, "# t = {}", sys.t)?;
    writeln!(out, "# center-of-mass = {:.12e}, {:.12e}, {:.12e}", com.x, com.y, com.z)?;
    writeln!(out, "# center-of-momentum = {:.12e}, {:.12e}, {:.12e}", vcom.x, vcom.y, vcom.z)?;
    writeln!(out, "{}", format.columns())?;

    for (id, p) in sys.particles.iter().enumerate() {
        let [a, b, c] = match format {
            SnapshotFormat::Cartesian => [p.x.x, p.x.y, p.x.z],
            SnapshotFormat::Lbr { sun_gc_dist } => {
                let (l, b, r) = cartesian_to_lbr(&p.x, sun_gc_dist);
                [l.to_degrees(), b.to_degrees(), r]
            }
        };
        writeln!(
            out,
            "{id} {a:.12e} {b:.12e} {c:.12e} {:.12e} {:.12e} {:.12e} {:.12e}",
            p.v.x, p.v.y, p.v.z, p.m
        )?;
    }
    Ok(())
}

/// Write one snapshot of `sys` to the file at `path`, replacing it
pub fn save_snapshot(path: &Path, sys: &System3, format: SnapshotFormat) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_snapshot(&mut out, sys, format)?;
    out.flush()
}

/// `out.txt` at step 40 becomes `out.40.txt`; the final snapshot keeps `base`
pub fn step_path(base: &Path, step: usize) -> PathBuf {
    let stem = base.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}.{step}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{step}"),
    };
    base.with_file_name(name)
}
