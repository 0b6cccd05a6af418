use cgmath::{InnerSpace, Matrix4, Point3, Quaternion, Vector3, VectorSpace};

use tileview_common::transform_ops::{
    compose_pivot_transform, interpolate_matrix, interpolate_point, interpolate_rotation,
};
use tileview_common::{ClipVector, EPSILON};

use super::props::{CuttingPlaneProps, Interpolation, TimelineEntryProps, TimelineProps, TransformValueProps};
use crate::symbology::RgbColor;

/// One keyframe of an evaluated timeline. `value == None` means "no override".
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry<T> {
    pub time: f64,
    pub interpolation: Interpolation,
    pub value: Option<T>,
}

/// Bracketing keyframes for a query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineInterval {
    pub index0: usize,
    pub index1: usize,
    /// 0 when clamped or when `index0` steps; otherwise the linear blend factor
    pub fraction: f64,
}

/// Locates the keyframes bracketing `time` in entries sorted ascending by time.
///
/// Times before the first keyframe clamp to it, times at or after the last clamp
/// to the last, both with a zero fraction. Returns `None` for an empty timeline
/// or a NaN time.
pub fn find_interval<T>(entries: &[TimelineEntry<T>], time: f64) -> Option<TimelineInterval> {
    if time.is_nan() {
        return None;
    }
    let first = entries.first()?;
    let last_index = entries.len() - 1;

    if time < first.time {
        return Some(TimelineInterval { index0: 0, index1: 0, fraction: 0.0 });
    }
    if time >= entries[last_index].time {
        return Some(TimelineInterval {
            index0: last_index,
            index1: last_index,
            fraction: 0.0,
        });
    }

    // First entry strictly after `time`; always in 1..=last_index here
    let index1 = entries.partition_point(|e| e.time <= time);
    let index0 = index1 - 1;
    let (e0, e1) = (&entries[index0], &entries[index1]);

    let span = e1.time - e0.time;
    let fraction = match e0.interpolation {
        Interpolation::Linear if span > 0.0 => (time - e0.time) / span,
        _ => 0.0,
    };

    Some(TimelineInterval { index0, index1, fraction })
}

/// A keyframed transform. `matrix` is always populated; `components` only when
/// the keyframe carried a full pivot/orientation/position decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformValue {
    pub matrix: Matrix4<f64>,
    pub components: Option<TransformComponents>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformComponents {
    pub pivot: Point3<f64>,
    pub orientation: Quaternion<f64>,
    pub position: Point3<f64>,
}

impl TransformComponents {
    pub fn to_matrix(&self) -> Matrix4<f64> {
        compose_pivot_transform(self.pivot, self.orientation, self.position)
    }
}

impl TransformValue {
    /// Returns `None` if the keyframe has neither a usable transform nor a full
    /// decomposition.
    fn from_props(props: &TransformValueProps) -> Option<Self> {
        let components = match (props.pivot, props.orientation, props.position) {
            (Some(pivot), Some([x, y, z, w]), Some(position)) => Some(TransformComponents {
                pivot: Point3::from(pivot),
                orientation: unit_quaternion(Quaternion::new(w, x, y, z)),
                position: Point3::from(position),
            }),
            _ => None,
        };

        let matrix = match &props.transform {
            Some(transform) => match transform.to_matrix() {
                Ok(matrix) => Some(matrix),
                Err(err) => {
                    log::warn!("Ignoring transform keyframe: {}", err);
                    None
                }
            },
            None => None,
        };

        match (matrix, components) {
            (Some(matrix), components) => Some(Self { matrix, components }),
            (None, Some(components)) => Some(Self {
                matrix: components.to_matrix(),
                components: Some(components),
            }),
            (None, None) => None,
        }
    }
}

/// A keyframed cutting plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuttingPlane {
    pub position: Point3<f64>,
    pub direction: Vector3<f64>,
    pub visible: bool,
    pub hidden: bool,
}

impl CuttingPlane {
    fn from_props(props: &CuttingPlaneProps) -> Self {
        Self {
            position: Point3::from(props.position),
            direction: Vector3::from(props.direction),
            visible: props.visible.unwrap_or(false),
            hidden: props.hidden.unwrap_or(false),
        }
    }
}

fn convert_entries<P, T>(
    entries: &[TimelineEntryProps<P>],
    convert: impl Fn(&P) -> Option<T>,
) -> Vec<TimelineEntry<T>> {
    let mut converted: Vec<TimelineEntry<T>> = entries
        .iter()
        .filter(|e| e.time.is_finite())
        .map(|e| TimelineEntry {
            time: e.time,
            interpolation: e.interpolation,
            value: e.value.as_ref().and_then(&convert),
        })
        .collect();

    // Stable, so keyframes sharing a time keep their persisted order
    converted.sort_by(|a, b| a.time.total_cmp(&b.time));
    converted
}

/// Up to four independent keyframe channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    visibility: Vec<TimelineEntry<f64>>,
    color: Vec<TimelineEntry<RgbColor>>,
    transform: Vec<TimelineEntry<TransformValue>>,
    cutting_plane: Vec<TimelineEntry<CuttingPlane>>,
}

impl Timeline {
    pub fn from_props(props: &TimelineProps) -> Self {
        Self {
            visibility: convert_entries(&props.visibility_timeline, |v| Some(*v)),
            color: convert_entries(&props.color_timeline, |c| Some(*c)),
            transform: convert_entries(&props.transform_timeline, TransformValue::from_props),
            cutting_plane: convert_entries(&props.cutting_plane_timeline, |c| {
                Some(CuttingPlane::from_props(c))
            }),
        }
    }

    pub fn visibility_entries(&self) -> &[TimelineEntry<f64>] {
        &self.visibility
    }

    pub fn color_entries(&self) -> &[TimelineEntry<RgbColor>] {
        &self.color
    }

    pub fn transform_entries(&self) -> &[TimelineEntry<TransformValue>] {
        &self.transform
    }

    pub fn cutting_plane_entries(&self) -> &[TimelineEntry<CuttingPlane>] {
        &self.cutting_plane
    }

    pub fn has_visibility(&self) -> bool {
        !self.visibility.is_empty()
    }

    pub fn has_color(&self) -> bool {
        !self.color.is_empty()
    }

    pub fn has_transform(&self) -> bool {
        !self.transform.is_empty()
    }

    pub fn has_cutting_plane(&self) -> bool {
        !self.cutting_plane.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !(self.has_visibility() || self.has_color() || self.has_transform() || self.has_cutting_plane())
    }

    /// Earliest and latest keyframe times across all channels.
    pub fn duration(&self) -> Option<(f64, f64)> {
        let ranges = [
            bounds(&self.visibility),
            bounds(&self.color),
            bounds(&self.transform),
            bounds(&self.cutting_plane),
        ];
        ranges
            .into_iter()
            .flatten()
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }

    /// Percent visible (0 to 100) at `time`, or `None` for no override.
    pub fn visibility_at(&self, time: f64) -> Option<f64> {
        let interval = find_interval(&self.visibility, time)?;
        let v0 = self.visibility[interval.index0].value?;
        if interval.fraction <= 0.0 {
            return Some(v0);
        }
        let v1 = self.visibility[interval.index1].value.unwrap_or(v0);
        Some(v0 + (v1 - v0) * interval.fraction)
    }

    pub fn color_at(&self, time: f64) -> Option<RgbColor> {
        let interval = find_interval(&self.color, time)?;
        let c0 = self.color[interval.index0].value?;
        if interval.fraction <= 0.0 {
            return Some(c0);
        }
        let c1 = self.color[interval.index1].value.unwrap_or(c0);
        Some(c0.interpolate(&c1, interval.fraction))
    }

    /// Animation transform at `time`.
    ///
    /// Keyframe pairs that both carry a decomposition blend orientation by slerp and
    /// pivot/position linearly. Otherwise the rotation is extracted from each full
    /// transform and blended along with the origin.
    pub fn transform_at(&self, time: f64) -> Option<Matrix4<f64>> {
        let interval = find_interval(&self.transform, time)?;
        let t0 = self.transform[interval.index0].value.as_ref()?;
        if interval.fraction <= 0.0 {
            return Some(t0.matrix);
        }
        let Some(t1) = self.transform[interval.index1].value.as_ref() else {
            return Some(t0.matrix);
        };

        let fraction = interval.fraction;
        let matrix = match (&t0.components, &t1.components) {
            (Some(c0), Some(c1)) => TransformComponents {
                pivot: interpolate_point(c0.pivot, c1.pivot, fraction),
                orientation: interpolate_rotation(c0.orientation, c1.orientation, fraction),
                position: interpolate_point(c0.position, c1.position, fraction),
            }
            .to_matrix(),
            _ => interpolate_matrix(&t0.matrix, &t1.matrix, fraction),
        };
        Some(matrix)
    }

    /// Clip produced by the cutting-plane channel at `time`.
    ///
    /// A fresh value is built on every call. A keyframe that is not being
    /// interpolated and is flagged `visible` or `hidden` produces no clip.
    pub fn clip_at(&self, time: f64) -> Option<ClipVector> {
        let interval = find_interval(&self.cutting_plane, time)?;
        let p0 = self.cutting_plane[interval.index0].value?;

        let (position, direction) = if interval.fraction > 0.0 {
            let p1 = self.cutting_plane[interval.index1].value.unwrap_or(p0);
            (
                interpolate_point(p0.position, p1.position, interval.fraction),
                p0.direction.lerp(p1.direction, interval.fraction),
            )
        } else {
            if p0.hidden || p0.visible {
                return None;
            }
            (p0.position, p0.direction)
        };

        if direction.magnitude2() < EPSILON {
            return None;
        }
        Some(ClipVector::from_plane(position, direction))
    }
}

fn unit_quaternion(q: Quaternion<f64>) -> Quaternion<f64> {
    if q.magnitude2() < EPSILON {
        Quaternion::new(1.0, 0.0, 0.0, 0.0)
    } else {
        q.normalize()
    }
}

fn bounds<T>(entries: &[TimelineEntry<T>]) -> Option<(f64, f64)> {
    Some((entries.first()?.time, entries.last()?.time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(times: &[f64], interpolation: Interpolation) -> Vec<TimelineEntry<f64>> {
        times
            .iter()
            .map(|t| TimelineEntry { time: *t, interpolation, value: Some(*t) })
            .collect()
    }

    #[test]
    fn test_find_interval_clamps() {
        let e = entries(&[0.0, 10.0, 20.0], Interpolation::Linear);

        assert_eq!(
            find_interval(&e, -5.0),
            Some(TimelineInterval { index0: 0, index1: 0, fraction: 0.0 })
        );
        assert_eq!(
            find_interval(&e, 25.0),
            Some(TimelineInterval { index0: 2, index1: 2, fraction: 0.0 })
        );
        assert_eq!(
            find_interval(&e, 20.0),
            Some(TimelineInterval { index0: 2, index1: 2, fraction: 0.0 })
        );
        assert!(find_interval::<f64>(&[], 1.0).is_none());
    }

    #[test]
    fn test_find_interval_brackets() {
        let e = entries(&[0.0, 10.0, 20.0], Interpolation::Linear);

        let interval = find_interval(&e, 15.0).unwrap();
        assert_eq!((interval.index0, interval.index1), (1, 2));
        assert!((interval.fraction - 0.5).abs() < EPSILON);

        let interval = find_interval(&e, 10.0).unwrap();
        assert_eq!((interval.index0, interval.index1), (1, 2));
        assert_eq!(interval.fraction, 0.0);
    }

    #[test]
    fn test_find_interval_step_has_no_fraction() {
        let e = entries(&[0.0, 10.0], Interpolation::Step);
        let interval = find_interval(&e, 7.0).unwrap();

        assert_eq!((interval.index0, interval.index1), (0, 1));
        assert_eq!(interval.fraction, 0.0);
    }

    #[test]
    fn test_nan_time_has_no_interval() {
        let e = entries(&[0.0, 10.0, 20.0], Interpolation::Linear);
        assert!(find_interval(&e, f64::NAN).is_none());

        let props: TimelineProps =
            serde_json::from_str(r#"{ "visibilityTimeline": [{ "time": 0, "value": 50 }] }"#).unwrap();
        let timeline = Timeline::from_props(&props);
        assert_eq!(timeline.visibility_at(f64::NAN), None);
        assert_eq!(timeline.visibility_at(f64::INFINITY), Some(50.0));
    }

    #[test]
    fn test_cutting_plane_entries_parse() {
        let props: TimelineProps = serde_json::from_str(
            r#"{ "cuttingPlaneTimeline": [
                { "time": 0, "value": { "position": [0, 0, 5], "direction": [0, 0, 1] } },
                { "time": 10 },
                { "time": 20, "value": null }
            ] }"#,
        )
        .unwrap();
        let timeline = Timeline::from_props(&props);

        assert_eq!(timeline.cutting_plane_entries().len(), 3);
        assert!(timeline.cutting_plane_entries()[1].value.is_none());
        assert!(timeline.cutting_plane_entries()[2].value.is_none());
        assert!(timeline.clip_at(0.0).is_some());
        assert!(timeline.clip_at(15.0).is_none());
    }

    #[test]
    fn test_entries_sorted_on_load() {
        let props: TimelineProps = serde_json::from_str(
            r#"{ "visibilityTimeline": [
                { "time": 20, "value": 3 },
                { "time": 0, "value": 1 },
                { "time": 10, "value": 2 }
            ] }"#,
        )
        .unwrap();
        let timeline = Timeline::from_props(&props);

        let times: Vec<f64> = timeline.visibility_entries().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 10.0, 20.0]);
        assert_eq!(timeline.duration(), Some((0.0, 20.0)));
    }
}
