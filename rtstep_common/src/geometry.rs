//! Pose and path geometry (spec §3, §4.1).
//!
//! A [`Pose`] is nine translational/rotational scalars in user units. The
//! planner's internal path geometry ([`Line`], [`Circle`]) operates over
//! 3-vectors: translation (X,Y,Z) is the primary path the [`Circle`]
//! geometry can curve through, while the rotational (A,B,C) and auxiliary
//! linear (U,V,W) components are always driven by a companion [`Line`] that
//! is interpolated in lockstep with the primary segment's progress (see
//! [`crate::tc`]). This mirrors the single documented exception the spec
//! calls out for ABC and generalizes it symmetrically to UVW, since nothing
//! in the data model gives UVW its own curved path type.

use std::ops::{Add, Sub};

/// A 3-vector, used for translation, rotation (ABC), and auxiliary (UVW)
/// sub-spaces alike.
pub type Vector3 = [f64; 3];

fn v_sub(a: Vector3, b: Vector3) -> Vector3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn v_add(a: Vector3, b: Vector3) -> Vector3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn v_scale(a: Vector3, s: f64) -> Vector3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn v_dot(a: Vector3, b: Vector3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn v_cross(a: Vector3, b: Vector3) -> Vector3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn v_norm(a: Vector3) -> f64 {
    v_dot(a, a).sqrt()
}

/// Six translational (X,Y,Z,U,V,W) plus three rotational (A,B,C) scalars in
/// user units (mm/inch for linear, degrees for rotary).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Pose {
    /// Build a pose from its translation (XYZ), auxiliary-linear (UVW) and
    /// rotational (ABC) sub-vectors.
    pub fn from_parts(xyz: Vector3, uvw: Vector3, abc: Vector3) -> Self {
        Self {
            x: xyz[0],
            y: xyz[1],
            z: xyz[2],
            u: uvw[0],
            v: uvw[1],
            w: uvw[2],
            a: abc[0],
            b: abc[1],
            c: abc[2],
        }
    }

    /// The X,Y,Z translation sub-vector — the primary path the trajectory
    /// planner's `Line`/`Circle` geometry curves through.
    pub fn xyz(&self) -> Vector3 {
        [self.x, self.y, self.z]
    }

    /// The U,V,W auxiliary-linear sub-vector.
    pub fn uvw(&self) -> Vector3 {
        [self.u, self.v, self.w]
    }

    /// The A,B,C rotational sub-vector.
    pub fn abc(&self) -> Vector3 {
        [self.a, self.b, self.c]
    }
}

impl Add for Pose {
    type Output = Pose;
    fn add(self, rhs: Pose) -> Pose {
        Pose {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
            u: self.u + rhs.u,
            v: self.v + rhs.v,
            w: self.w + rhs.w,
            a: self.a + rhs.a,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
        }
    }
}

impl Sub for Pose {
    type Output = Pose;
    fn sub(self, rhs: Pose) -> Pose {
        Pose {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
            u: self.u - rhs.u,
            v: self.v - rhs.v,
            w: self.w - rhs.w,
            a: self.a - rhs.a,
            b: self.b - rhs.b,
            c: self.c - rhs.c,
        }
    }
}

/// Common interface over the path geometry a TC advances along: a scalar
/// `u` in `[0, length()]` maps to a point in the geometry's own 3-vector
/// sub-space.
pub trait MotionGeometry {
    /// Position at arc-length (or, for a companion line, magnitude) `u`
    /// along the path.
    fn point(&self, u: f64) -> Vector3;

    /// Total arc length (translation) or total magnitude (companion line)
    /// of the path.
    fn length(&self) -> f64;
}

/// A straight segment between two 3-vectors: start, end, unit direction,
/// and length. Used both for the primary translational path of a LINEAR
/// move and for the ABC/UVW companion lines of any move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub start: Vector3,
    pub end: Vector3,
    pub direction: Vector3,
    pub length: f64,
}

impl Line {
    /// Build a line from its endpoints. Degenerate (zero-length) lines get
    /// a zero direction vector; callers must check `length() <= 0` before
    /// relying on `direction`.
    pub fn new(start: Vector3, end: Vector3) -> Self {
        let delta = v_sub(end, start);
        let length = v_norm(delta);
        let direction = if length > 0.0 {
            v_scale(delta, 1.0 / length)
        } else {
            [0.0, 0.0, 0.0]
        };
        Self {
            start,
            end,
            direction,
            length,
        }
    }
}

impl MotionGeometry for Line {
    fn point(&self, u: f64) -> Vector3 {
        v_add(self.start, v_scale(self.direction, u))
    }

    fn length(&self) -> f64 {
        self.length
    }
}

/// A circular arc: center, unit normal, start/end points, radius, and
/// signed swept angle in radians (may exceed `2*PI` for full turns).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vector3,
    pub normal: Vector3,
    pub start: Vector3,
    pub end: Vector3,
    pub radius: f64,
    pub angle: f64,
}

impl Circle {
    /// Build a circular arc from its start/end points, center, unit
    /// normal, and number of extra full turns (`turn`, signed — negative
    /// reverses winding direction for the extra turns only, matching the
    /// G-code `P`-word convention).
    ///
    /// The swept angle between `start` and `end` (0..2*PI, winding in the
    /// normal's right-hand sense) has `turn` additional full rotations
    /// added, sign-matched to `turn`.
    pub fn new(start: Vector3, end: Vector3, center: Vector3, normal: Vector3, turn: i32) -> Self {
        let n = {
            let len = v_norm(normal);
            if len > 0.0 {
                v_scale(normal, 1.0 / len)
            } else {
                [0.0, 0.0, 1.0]
            }
        };
        let r0 = v_sub(start, center);
        let r1 = v_sub(end, center);
        let radius = v_norm(r0);

        // Angle between r0 and r1 about axis n, right-hand sense, in [0, 2*PI).
        let sin_a = v_dot(n, v_cross(r0, r1));
        let cos_a = v_dot(r0, r1);
        let mut base_angle = sin_a.atan2(cos_a);
        if base_angle < 0.0 {
            base_angle += 2.0 * std::f64::consts::PI;
        }

        let angle = if turn >= 0 {
            base_angle + turn as f64 * 2.0 * std::f64::consts::PI
        } else {
            // Negative turn: traverse the "long way" around, then add the
            // remaining full negative turns.
            (base_angle - 2.0 * std::f64::consts::PI) + turn as f64 * 2.0 * std::f64::consts::PI
        };

        Self {
            center,
            normal: n,
            start,
            end,
            radius,
            angle,
        }
    }
}

impl MotionGeometry for Circle {
    /// `u` here is an angle in radians (caller passes `currentPos / radius`
    /// per spec §4.1).
    fn point(&self, u: f64) -> Vector3 {
        if self.radius <= 0.0 {
            return self.start;
        }
        let r0 = v_sub(self.start, self.center);
        // Rodrigues' rotation formula, rotating r0 by angle u about self.normal.
        let cos_u = u.cos();
        let sin_u = u.sin();
        let term1 = v_scale(r0, cos_u);
        let term2 = v_scale(v_cross(self.normal, r0), sin_u);
        let term3 = v_scale(self.normal, v_dot(self.normal, r0) * (1.0 - cos_u));
        v_add(self.center, v_add(v_add(term1, term2), term3))
    }

    fn length(&self) -> f64 {
        self.radius * self.angle.abs()
    }
}

/// Tagged union over the two motion kinds a TC can advance along, per the
/// design note favoring a closed sum type over open virtual dispatch since
/// the planner's update logic is identical across variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathGeometry {
    Linear(Line),
    Circular(Circle),
}

impl MotionGeometry for PathGeometry {
    fn point(&self, u: f64) -> Vector3 {
        match self {
            PathGeometry::Linear(l) => l.point(u),
            PathGeometry::Circular(c) => c.point(u),
        }
    }

    fn length(&self) -> f64 {
        match self {
            PathGeometry::Linear(l) => l.length(),
            PathGeometry::Circular(c) => c.length(),
        }
    }
}

impl PathGeometry {
    /// Position at the given arc-length progress along the primary path,
    /// per spec §4.1's position-query rule: linear geometry is queried
    /// directly by arc length, circular geometry by `progress / radius`
    /// (an angle in radians).
    pub fn point_at_progress(&self, progress: f64) -> Vector3 {
        match self {
            PathGeometry::Linear(l) => l.point(progress),
            PathGeometry::Circular(c) => {
                if c.radius > 0.0 {
                    c.point(progress / c.radius)
                } else {
                    c.start
                }
            }
        }
    }
}
