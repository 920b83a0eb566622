//! Mapping of local az/el look angles onto the tilted three-axis mount.
//!
//! The train axis turns the whole platform about the local vertical. On the
//! platform the az/el mount is tilted by a fixed angle about the horizontal
//! axis pointing at azimuth `train`, so the mount zenith leans toward
//! azimuth `train + 90`. Mount azimuth is measured on the platform, from the
//! tilt axis, clockwise.

/// Look angle in the mount frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountAngles {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

pub fn tilt_transform(azimuth_deg: f64, elevation_deg: f64, train_deg: f64, tilt_deg: f64) -> MountAngles {
    let (sin_az, cos_az) = azimuth_deg.to_radians().sin_cos();
    let (sin_el, cos_el) = elevation_deg.to_radians().sin_cos();
    let (sin_tr, cos_tr) = train_deg.to_radians().sin_cos();
    let (sin_ti, cos_ti) = tilt_deg.to_radians().sin_cos();

    let east = cos_el * sin_az;
    let north = cos_el * cos_az;
    let up = sin_el;

    // platform basis: `a` along the tilt axis, `b` a quarter turn clockwise
    let along = east * sin_tr + north * cos_tr;
    let across = east * cos_tr - north * sin_tr;

    let x = along;
    let y = across * cos_ti - up * sin_ti;
    let z = up * cos_ti + across * sin_ti;

    MountAngles {
        azimuth_deg: wrap(y.atan2(x).to_degrees(), 360.0),
        elevation_deg: z.clamp(-1.0, 1.0).asin().to_degrees(),
    }
}

/// `angle` folded into [0, period). Plain `rem_euclid` rounds tiny
/// negative inputs up to `period` itself.
fn wrap(angle: f64, period: f64) -> f64 {
    let folded = angle.rem_euclid(period);
    if folded >= period {
        0.0
    } else {
        folded
    }
}

/// Signed shortest step from `from` to `to`, in (-180, 180].
pub fn wrapped_delta(from: f64, to: f64) -> f64 {
    let d = wrap(to - from, 360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Fold an angle into [-180, 180).
pub fn normalize_180(angle: f64) -> f64 {
    wrap(angle + 180.0, 360.0) - 180.0
}

/// Fold a train angle into (-90, 90]; the half-turn twin leans the mount the other way.
pub fn fold_train(angle: f64) -> f64 {
    90.0 - wrap(90.0 - angle, 180.0)
}

/// Make an azimuth series continuous and fit it inside `±limit`.
///
/// The series starts in [-180, 180) and follows the shortest step between
/// samples. If it then leaves the band but a whole-turn shift fits it back
/// in, the shift is applied. A span wider than the band is left as is.
pub fn unwrap_into_band(azimuths: &[f64], limit: f64) -> Vec<f64> {
    let Some(&first) = azimuths.first() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(azimuths.len());
    let mut prev = normalize_180(first);
    out.push(prev);
    for &az in &azimuths[1..] {
        prev += wrapped_delta(prev, az);
        out.push(prev);
    }

    let min = out.iter().copied().fold(f64::INFINITY, f64::min);
    let max = out.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let shift = if max > limit && min - 360.0 >= -limit {
        -360.0
    } else if min < -limit && max + 360.0 <= limit {
        360.0
    } else {
        if max > limit || min < -limit {
            log::warn!(
                "Azimuth span [{:.1}, {:.1}] exceeds cable wrap of ±{:.0}",
                min,
                max,
                limit
            );
        }
        0.0
    };

    if shift != 0.0 {
        for az in &mut out {
            *az += shift;
        }
    }
    out
}
