// Angles are in degrees, 0 pointing along +x, growing towards +y (screen space).

/// Unit vector for a heading in degrees.
pub fn heading(angle: f32) -> (f32, f32) {
    let rad = angle.to_radians();
    (rad.cos(), rad.sin())
}

/// Heading in degrees (0..360) from one point towards another.
pub fn bearing(from: (f32, f32), to: (f32, f32)) -> f32 {
    normalize_angle((to.1 - from.1).atan2(to.0 - from.0).to_degrees())
}

pub fn normalize_angle(angle: f32) -> f32 {
    angle.rem_euclid(360.0)
}

/// Signed smallest rotation (-180..=180) turning `from` into `to`.
pub fn angle_difference(from: f32, to: f32) -> f32 {
    let diff = normalize_angle(to - from);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Distance from point `p` to the segment `a`-`b`.
pub fn segment_distance(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * abx + (p.1 - a.1) * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + abx * t, a.1 + aby * t);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}
