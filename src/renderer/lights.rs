//! Light Aggregation
//!
//! Once per frame the scene's lights are counted, fitted into the
//! `max_lights` budget and flattened into the arrays the light uniforms are
//! uploaded from.

use glam::Vec3;

use crate::scene::{Light, LightKind, Node, NodeKind, Scene};

/// Per-type light counts compiled into programs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LightBudget {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
    /// Never limited by the budget.
    pub hemisphere: u32,
}

fn shading_light(node: &Node) -> Option<&Light> {
    match &node.kind {
        NodeKind::Light(light) if node.visible && !light.only_shadow => Some(light),
        _ => None,
    }
}

/// Visible lights that contribute to shading, by type.
#[must_use]
pub fn count_lights(scene: &Scene) -> LightBudget {
    let mut counts = LightBudget::default();
    for light in scene
        .lights()
        .iter()
        .filter_map(|&h| scene.node(h))
        .filter_map(shading_light)
    {
        match light.kind {
            LightKind::Ambient => {}
            LightKind::Directional(_) => counts.directional += 1,
            LightKind::Point(_) => counts.point += 1,
            LightKind::Spot(_) => counts.spot += 1,
            LightKind::Hemisphere(_) => counts.hemisphere += 1,
        }
    }
    counts
}

/// Directional and spot lights that render a shadow map.
#[must_use]
pub fn count_shadows(scene: &Scene) -> u32 {
    scene
        .lights()
        .iter()
        .filter_map(|&h| scene.node(h))
        .filter(|n| matches!(&n.kind, NodeKind::Light(l) if l.casts_shadow_map()))
        .count() as u32
}

fn ceil_div(numerator: u32, denominator: u32) -> u32 {
    numerator.div_ceil(denominator)
}

/// Fits directional, point and spot counts into `max_lights`.
///
/// Counts are kept when they fit. Otherwise directional lights get their
/// proportional share (rounded up), and the rest is split between point and
/// spot lights in proportion, rounding in favour of point lights. No type is
/// given more slots than it has lights.
#[must_use]
pub fn allocate_lights(counts: LightBudget, max_lights: u32) -> LightBudget {
    let total = counts.directional + counts.point + counts.spot;
    if total <= max_lights {
        return counts;
    }

    let directional = counts
        .directional
        .min(ceil_div(max_lights * counts.directional, total));
    let remaining = max_lights - directional;

    let point_and_spot = counts.point + counts.spot;
    let point = if point_and_spot == 0 {
        0
    } else {
        counts
            .point
            .min(ceil_div(remaining * counts.point, point_and_spot))
    };
    let spot = counts.spot.min(remaining - point);

    LightBudget {
        directional,
        point,
        spot,
        hemisphere: counts.hemisphere,
    }
}

/// Flattened light uniforms for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightArrays {
    pub ambient: Vec3,

    pub directional_colors: Vec<f32>,
    pub directional_directions: Vec<f32>,

    pub point_colors: Vec<f32>,
    pub point_positions: Vec<f32>,
    pub point_distances: Vec<f32>,

    pub spot_colors: Vec<f32>,
    pub spot_positions: Vec<f32>,
    pub spot_directions: Vec<f32>,
    pub spot_distances: Vec<f32>,
    pub spot_angles_cos: Vec<f32>,
    pub spot_exponents: Vec<f32>,

    pub hemi_sky_colors: Vec<f32>,
    pub hemi_ground_colors: Vec<f32>,
    pub hemi_directions: Vec<f32>,
}

fn scaled_color(color: Vec3, intensity: f32, gamma_input: bool) -> Vec3 {
    if gamma_input {
        color * color * (intensity * intensity)
    } else {
        color * intensity
    }
}

impl LightArrays {
    /// Collects up to `budget` lights of each type in scene order.
    #[must_use]
    pub fn aggregate(scene: &Scene, budget: LightBudget, gamma_input: bool) -> Self {
        let mut arrays = Self::default();
        let mut used = LightBudget::default();

        for &handle in scene.lights() {
            let Some(node) = scene.node(handle) else {
                continue;
            };
            let Some(light) = shading_light(node) else {
                continue;
            };
            let position = node.transform.world_position();
            let target_of = |target: Option<crate::scene::NodeHandle>| {
                target.map_or(Vec3::ZERO, |t| scene.world_position(t))
            };

            match &light.kind {
                LightKind::Ambient => {
                    arrays.ambient += if gamma_input {
                        light.color * light.color
                    } else {
                        light.color
                    };
                }
                LightKind::Directional(dir) => {
                    if used.directional >= budget.directional {
                        continue;
                    }
                    used.directional += 1;
                    let color = scaled_color(light.color, light.intensity, gamma_input);
                    let direction = (position - target_of(dir.target)).normalize_or_zero();
                    arrays.directional_colors.extend_from_slice(&color.to_array());
                    arrays.directional_directions.extend_from_slice(&direction.to_array());
                }
                LightKind::Point(point) => {
                    if used.point >= budget.point {
                        continue;
                    }
                    used.point += 1;
                    let color = scaled_color(light.color, light.intensity, gamma_input);
                    arrays.point_colors.extend_from_slice(&color.to_array());
                    arrays.point_positions.extend_from_slice(&position.to_array());
                    arrays.point_distances.push(point.distance);
                }
                LightKind::Spot(spot) => {
                    if used.spot >= budget.spot {
                        continue;
                    }
                    used.spot += 1;
                    let color = scaled_color(light.color, light.intensity, gamma_input);
                    let direction = (position - target_of(spot.target)).normalize_or_zero();
                    arrays.spot_colors.extend_from_slice(&color.to_array());
                    arrays.spot_positions.extend_from_slice(&position.to_array());
                    arrays.spot_directions.extend_from_slice(&direction.to_array());
                    arrays.spot_distances.push(spot.distance);
                    arrays.spot_angles_cos.push(spot.angle.cos());
                    arrays.spot_exponents.push(spot.exponent);
                }
                LightKind::Hemisphere(hemi) => {
                    if used.hemisphere >= budget.hemisphere {
                        continue;
                    }
                    used.hemisphere += 1;
                    let sky = scaled_color(light.color, light.intensity, gamma_input);
                    let ground = scaled_color(hemi.ground_color, light.intensity, gamma_input);
                    arrays.hemi_sky_colors.extend_from_slice(&sky.to_array());
                    arrays.hemi_ground_colors.extend_from_slice(&ground.to_array());
                    arrays
                        .hemi_directions
                        .extend_from_slice(&position.normalize_or_zero().to_array());
                }
            }
        }

        arrays
    }

    /// Number of directional lights collected.
    #[must_use]
    pub fn directional_count(&self) -> usize {
        self.directional_colors.len() / 3
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_colors.len() / 3
    }

    #[must_use]
    pub fn spot_count(&self) -> usize {
        self.spot_colors.len() / 3
    }

    #[must_use]
    pub fn hemisphere_count(&self) -> usize {
        self.hemi_sky_colors.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(directional: u32, point: u32, spot: u32) -> LightBudget {
        LightBudget {
            directional,
            point,
            spot,
            hemisphere: 0,
        }
    }

    #[test]
    fn counts_within_budget_are_kept() {
        assert_eq!(allocate_lights(counts(1, 2, 1), 4), counts(1, 2, 1));
    }

    #[test]
    fn over_budget_never_exceeds_maximum() {
        for (d, p, s) in [(3, 3, 3), (0, 10, 0), (5, 0, 5), (1, 7, 2), (10, 1, 1)] {
            let budget = allocate_lights(counts(d, p, s), 4);
            assert!(budget.directional + budget.point + budget.spot <= 4, "{d} {p} {s}");
            assert!(budget.directional <= d && budget.point <= p && budget.spot <= s);
        }
    }

    #[test]
    fn point_lights_take_the_rounding() {
        let budget = allocate_lights(counts(0, 3, 3), 5);
        assert_eq!(budget.point, 3);
        assert_eq!(budget.spot, 2);
    }
}
