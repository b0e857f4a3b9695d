// Radial gauge geometry
//
// Angles are in degrees, measured clockwise from the positive x axis in screen
// coordinates (y grows downwards). A gauge starts at 135° and sweeps 270°.
use crate::domain::metric::Metric;
use serde::Serialize;

pub const START_ANGLE: f64 = 135.0;
pub const SWEEP: f64 = 270.0;
pub const END_ANGLE: f64 = START_ANGLE + SWEEP;
/// Angular width of the marker drawn when a bipolar gauge reads exactly zero.
pub const ZERO_MARKER_WIDTH: f64 = 0.1;

const DEFAULT_SIZE: f64 = 220.0;
const DEFAULT_STROKE_WIDTH: f64 = 18.0;
const NEEDLE_INSET: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeRange {
    pub min: f64,
    pub max: f64,
}

impl GaugeRange {
    /// Observed min/max of a metric, if it has seen a sample.
    pub fn observed(metric: &Metric) -> Option<GaugeRange> {
        Some(GaugeRange {
            min: metric.min?,
            max: metric.max?,
        })
    }

    /// `[-m, m]` with `m = max(|min|, max)` of the observed values.
    pub fn symmetric(metric: &Metric) -> Option<GaugeRange> {
        let observed = Self::observed(metric)?;
        let m = observed.min.abs().max(observed.max);
        Some(GaugeRange { min: -m, max: m })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Needle {
    pub angle: f64,
    pub from: Point,
    pub to: Point,
}

/// One circular arc on the gauge track, with the flags an SVG elliptical-arc
/// command needs to draw it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArcSegment {
    pub start_angle: f64,
    pub end_angle: f64,
    pub radius: f64,
    pub start: Point,
    pub end: Point,
    pub large_arc: bool,
    pub sweep: bool,
}

impl ArcSegment {
    pub fn svg_path(&self) -> String {
        format!(
            "M {:.3} {:.3} A {} {} 0 {} {} {:.3} {:.3}",
            self.start.x,
            self.start.y,
            self.radius,
            self.radius,
            u8::from(self.large_arc),
            u8::from(self.sweep),
            self.end.x,
            self.end.y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SingleArc {
    pub value_angle: f64,
    pub needle: Needle,
    pub left_arc: ArcSegment,
    pub right_arc: ArcSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Negative,
    Zero,
    Positive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignedArc {
    pub polarity: Polarity,
    pub arc: ArcSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BipolarArc {
    pub zero_angle: f64,
    pub needle: Needle,
    pub signed_arc: SignedArc,
    /// Neutral track below and above zero.
    pub background: [ArcSegment; 2],
}

/// Canvas dimensions a gauge is laid out on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeGeometry {
    center: f64,
    radius: f64,
    needle_length: f64,
}

impl Default for GaugeGeometry {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE, DEFAULT_STROKE_WIDTH)
    }
}

impl GaugeGeometry {
    pub fn new(size: f64, stroke_width: f64) -> Self {
        let radius = (size - stroke_width) / 2.0;
        Self {
            center: size / 2.0,
            radius,
            needle_length: radius - NEEDLE_INSET,
        }
    }

    pub fn single_arc(&self, min: f64, max: f64, value: f64) -> SingleArc {
        let value_angle = value_angle(min, max, value);
        SingleArc {
            value_angle,
            needle: self.needle(value_angle),
            left_arc: self.arc(START_ANGLE, value_angle),
            right_arc: self.arc(value_angle, END_ANGLE),
        }
    }

    pub fn bipolar_arc(&self, min: f64, max: f64, value: f64) -> BipolarArc {
        let zero_angle = zero_angle(min, max);
        let needle_angle = value_angle(min, max, value);

        let (polarity, start, end) = if value < 0.0 {
            (Polarity::Negative, needle_angle, zero_angle)
        } else if value > 0.0 {
            (Polarity::Positive, zero_angle, needle_angle)
        } else {
            (Polarity::Zero, zero_angle, zero_angle + ZERO_MARKER_WIDTH)
        };

        BipolarArc {
            zero_angle,
            needle: self.needle(needle_angle),
            signed_arc: SignedArc {
                polarity,
                arc: self.arc(start, end),
            },
            background: [
                self.arc(START_ANGLE, zero_angle),
                self.arc(zero_angle, END_ANGLE),
            ],
        }
    }

    pub fn arc(&self, start_angle: f64, end_angle: f64) -> ArcSegment {
        let delta = (end_angle - start_angle + 360.0).rem_euclid(360.0);
        ArcSegment {
            start_angle,
            end_angle,
            radius: self.radius,
            start: self.point(self.radius, start_angle),
            end: self.point(self.radius, end_angle),
            large_arc: delta > 180.0,
            sweep: end_angle > start_angle,
        }
    }

    fn needle(&self, angle: f64) -> Needle {
        Needle {
            angle,
            from: Point {
                x: self.center,
                y: self.center,
            },
            to: self.point(self.needle_length, angle),
        }
    }

    fn point(&self, length: f64, angle: f64) -> Point {
        let rad = angle.to_radians();
        Point {
            x: self.center + length * rad.cos(),
            y: self.center + length * rad.sin(),
        }
    }
}

/// Angle of `value` on a `[min, max]` gauge, clamped to the track. Degenerate
/// ranges put the value at the center of the sweep.
pub fn value_angle(min: f64, max: f64, value: f64) -> f64 {
    if !(max > min) {
        return START_ANGLE + SWEEP / 2.0;
    }
    let percent = (value.clamp(min, max) - min) / (max - min);
    let percent = if percent.is_nan() { 0.0 } else { percent };
    START_ANGLE + percent * SWEEP
}

/// Angle at which the value 0 sits on a `[min, max]` gauge.
pub fn zero_angle(min: f64, max: f64) -> f64 {
    if !(max > min) {
        return START_ANGLE + SWEEP / 2.0;
    }
    START_ANGLE + (min.abs() / (max - min)) * SWEEP
}
