//! Static external potential of the host galaxy
//!
//! The galaxy is the sum of up to three analytic components: a disk, a
//! central spherical bulge and a dark halo. Each category is a closed enum so
//! the per-particle evaluation is a plain `match`, with no dynamic dispatch.
//!
//! All formulas use `G = 1`.

use std::fmt;

use crate::simulation::states::NVec3;

/// Normalization tying `vhalo` to the NFW mass scale
const NFW_NORM: f64 = 0.2162165954;

/// Below this `r / scale_length` the exponential disk uses its series form
const EXP_DISK_SERIES_LIMIT: f64 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disk {
    MiyamotoNagai {
        mass: f64,
        scale_length: f64,
        scale_height: f64,
    },
    /// Spherical approximation of an exponential disk
    Exponential { mass: f64, scale_length: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Spherical {
    /// Hernquist bulge
    Hernquist { mass: f64, scale: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Halo {
    Logarithmic {
        vhalo: f64,
        scale_length: f64,
        flatten_z: f64,
    },
    Nfw { vhalo: f64, scale_length: f64 },
    Triaxial {
        vhalo: f64,
        scale_length: f64,
        flatten_x: f64,
        flatten_y: f64,
        flatten_z: f64,
        triax_angle: f64, // degrees
    },
}

/// Sum of the configured galaxy components. Absent components contribute
/// nothing, present ones are always on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GalaxyPotential {
    pub disk: Option<Disk>,
    pub spherical: Option<Spherical>,
    pub halo: Option<Halo>,
}

impl GalaxyPotential {
    pub fn is_empty(&self) -> bool {
        self.disk.is_none() && self.spherical.is_none() && self.halo.is_none()
    }

    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        let mut acc = NVec3::zeros();
        if let Some(disk) = &self.disk {
            acc += disk.acceleration(pos);
        }
        if let Some(sphere) = &self.spherical {
            acc += sphere.acceleration(pos);
        }
        if let Some(halo) = &self.halo {
            acc += halo.acceleration(pos);
        }
        acc
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        self.disk.map_or(0.0, |d| d.potential(pos))
            + self.spherical.map_or(0.0, |s| s.potential(pos))
            + self.halo.map_or(0.0, |h| h.potential(pos))
    }
}

impl Disk {
    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        match *self {
            Disk::MiyamotoNagai {
                mass,
                scale_length,
                scale_height,
            } => {
                let zp = (pos.z * pos.z + scale_height * scale_height).sqrt();
                let azp = scale_length + zp;
                let rp = pos.x * pos.x + pos.y * pos.y + azp * azp;
                let rth = rp * rp.sqrt();
                NVec3::new(
                    -mass * pos.x / rth,
                    -mass * pos.y / rth,
                    -mass * pos.z * azp / (zp * rth),
                )
            }
            Disk::Exponential { mass, scale_length } => {
                let r = pos.norm();
                if r == 0.0 {
                    return NVec3::zeros();
                }
                let x = r / scale_length;
                // (e^-x (1 + x) - 1) / x^2, which tends to -1/2 at the center
                let bracket = if x < EXP_DISK_SERIES_LIMIT {
                    -0.5 + x * (1.0 / 3.0 + x * (-0.125 + x * (1.0 / 30.0 - x / 144.0)))
                } else {
                    ((-x).exp() * (1.0 + x) - 1.0) / (x * x)
                };
                pos * (mass * bracket / (scale_length * scale_length * r))
            }
        }
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        match *self {
            Disk::MiyamotoNagai {
                mass,
                scale_length,
                scale_height,
            } => {
                let zp = (pos.z * pos.z + scale_height * scale_height).sqrt();
                let azp = scale_length + zp;
                -mass / (pos.x * pos.x + pos.y * pos.y + azp * azp).sqrt()
            }
            Disk::Exponential { mass, scale_length } => {
                let r = pos.norm();
                if r == 0.0 {
                    return -mass / scale_length;
                }
                mass * (-r / scale_length).exp_m1() / r
            }
        }
    }
}

impl Spherical {
    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        match *self {
            Spherical::Hernquist { mass, scale } => {
                let r = pos.norm();
                if r == 0.0 {
                    return NVec3::zeros();
                }
                let tmp = scale + r;
                pos * (-mass / (r * tmp * tmp))
            }
        }
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        match *self {
            Spherical::Hernquist { mass, scale } => -mass / (pos.norm() + scale),
        }
    }
}

impl Halo {
    /// Coefficients of the rotated, flattened x-y quadratic form of the
    /// triaxial halo: `c1 x^2 + c2 y^2 + c3 x y`
    pub fn triaxial_coefficients(flatten_x: f64, flatten_y: f64, triax_angle: f64) -> (f64, f64, f64) {
        let phi = triax_angle.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let qx2 = flatten_x * flatten_x;
        let qy2 = flatten_y * flatten_y;

        let c1 = cos_phi * cos_phi / qx2 + sin_phi * sin_phi / qy2;
        let c2 = cos_phi * cos_phi / qy2 + sin_phi * sin_phi / qx2;
        let c3 = 2.0 * sin_phi * cos_phi * (1.0 / qx2 - 1.0 / qy2);
        (c1, c2, c3)
    }

    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        match *self {
            Halo::Logarithmic {
                vhalo,
                scale_length,
                flatten_z,
            } => {
                let tvsqr = -2.0 * vhalo * vhalo;
                let qsqr = flatten_z * flatten_z;
                let zsqr = pos.z * pos.z;
                let arst = scale_length * scale_length + pos.x * pos.x + pos.y * pos.y;
                let denom = zsqr / qsqr + arst;
                NVec3::new(
                    tvsqr * pos.x / denom,
                    tvsqr * pos.y / denom,
                    tvsqr * pos.z / (qsqr * arst + zsqr),
                )
            }
            Halo::Nfw { vhalo, scale_length } => {
                let r = pos.norm();
                if r == 0.0 {
                    return NVec3::zeros();
                }
                let ar = scale_length + r;
                let c = scale_length * vhalo * vhalo * (r - ar * (ar / scale_length).ln())
                    / (NFW_NORM * r * r * r * ar);
                pos * c
            }
            Halo::Triaxial {
                vhalo,
                scale_length,
                flatten_x,
                flatten_y,
                flatten_z,
                triax_angle,
            } => {
                let (c1, c2, c3) = Self::triaxial_coefficients(flatten_x, flatten_y, triax_angle);
                let qzs = flatten_z * flatten_z;
                let mvsqr = -vhalo * vhalo;
                let zsqr = pos.z * pos.z;
                let arst = scale_length * scale_length
                    + c1 * pos.x * pos.x
                    + c3 * pos.x * pos.y
                    + c2 * pos.y * pos.y;
                let arst2 = zsqr / qzs + arst;
                NVec3::new(
                    mvsqr * (2.0 * c1 * pos.x + c3 * pos.y) / arst2,
                    mvsqr * (2.0 * c2 * pos.y + c3 * pos.x) / arst2,
                    2.0 * mvsqr * pos.z / (qzs * arst + zsqr),
                )
            }
        }
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        match *self {
            Halo::Logarithmic {
                vhalo,
                scale_length,
                flatten_z,
            } => {
                let arg = scale_length * scale_length
                    + pos.x * pos.x
                    + pos.y * pos.y
                    + pos.z * pos.z / (flatten_z * flatten_z);
                vhalo * vhalo * arg.ln()
            }
            Halo::Nfw { vhalo, scale_length } => {
                let r = pos.norm();
                let k = vhalo * vhalo * scale_length / NFW_NORM;
                if r == 0.0 {
                    // limit of ln(1 + r/a) / r
                    return -k / scale_length;
                }
                -k * (1.0 + r / scale_length).ln() / r
            }
            Halo::Triaxial {
                vhalo,
                scale_length,
                flatten_x,
                flatten_y,
                flatten_z,
                triax_angle,
            } => {
                let (c1, c2, c3) = Self::triaxial_coefficients(flatten_x, flatten_y, triax_angle);
                let arg = scale_length * scale_length
                    + c1 * pos.x * pos.x
                    + c3 * pos.x * pos.y
                    + c2 * pos.y * pos.y
                    + pos.z * pos.z / (flatten_z * flatten_z);
                vhalo * vhalo * arg.ln()
            }
        }
    }
}

impl fmt::Display for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disk::MiyamotoNagai {
                mass,
                scale_length,
                scale_height,
            } => write!(
                f,
                "miyamoto-nagai {{ mass = {mass}, scale-length = {scale_length}, scale-height = {scale_height} }}"
            ),
            Disk::Exponential { mass, scale_length } => {
                write!(f, "exponential {{ mass = {mass}, scale-length = {scale_length} }}")
            }
        }
    }
}

impl fmt::Display for Spherical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spherical::Hernquist { mass, scale } => {
                write!(f, "sphere {{ mass = {mass}, r0-scale = {scale} }}")
            }
        }
    }
}

impl fmt::Display for Halo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halo::Logarithmic {
                vhalo,
                scale_length,
                flatten_z,
            } => write!(
                f,
                "logarithmic {{ vhalo = {vhalo}, scale-length = {scale_length}, z-flattening = {flatten_z} }}"
            ),
            Halo::Nfw { vhalo, scale_length } => {
                write!(f, "nfw {{ vhalo = {vhalo}, scale-length = {scale_length} }}")
            }
            Halo::Triaxial {
                vhalo,
                scale_length,
                flatten_x,
                flatten_y,
                flatten_z,
                triax_angle,
            } => write!(
                f,
                "triaxial {{ vhalo = {vhalo}, scale-length = {scale_length}, x-flattening = {flatten_x}, \
                 y-flattening = {flatten_y}, z-flattening = {flatten_z}, triaxial-angle = {triax_angle} }}"
            ),
        }
    }
}

impl fmt::Display for GalaxyPotential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn line<T: fmt::Display>(f: &mut fmt::Formatter<'_>, name: &str, c: &Option<T>) -> fmt::Result {
            match c {
                Some(c) => writeln!(f, "    {name:<9} = {c}"),
                None => writeln!(f, "    {name:<9} = none"),
            }
        }
        writeln!(f, "{{")?;
        line(f, "disk", &self.disk)?;
        line(f, "spherical", &self.spherical)?;
        line(f, "halo", &self.halo)?;
        write!(f, "  }}")
    }
}
