use serde::{Deserialize, Serialize};

use super::lerp_f32;

/// How a curve fills the gap between two keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveInterpolation {
    /// Hold the left key's value.
    Constant,
    Linear,
    /// Cubic Hermite using each key's tangents.
    #[default]
    Hermite,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub tangent_in: f32,
    #[serde(default)]
    pub tangent_out: f32,
}

impl CurveKey {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            tangent_in: 0.0,
            tangent_out: 0.0,
        }
    }
}

/// Piecewise curve over keys sorted by `x`. Inputs outside the keyed domain hold the end values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatCurve {
    pub keys: Vec<CurveKey>,
    #[serde(default)]
    pub interpolation: CurveInterpolation,
}

impl FloatCurve {
    pub fn new(keys: Vec<CurveKey>, interpolation: CurveInterpolation) -> Self {
        Self {
            keys,
            interpolation,
        }
    }

    /// Check the keys can be evaluated: at least one, all finite, `x` strictly increasing.
    pub fn validate(&self) -> Result<(), String> {
        if self.keys.is_empty() {
            return Err("curve has no keys".to_string());
        }
        for (i, key) in self.keys.iter().enumerate() {
            let finite = [key.x, key.y, key.tangent_in, key.tangent_out]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(format!("key {i} is not finite"));
            }
        }
        if let Some(i) = self.keys.windows(2).position(|w| w[1].x <= w[0].x) {
            return Err(format!("key {} does not come after key {}", i + 1, i));
        }
        Ok(())
    }

    pub fn evaluate(&self, x: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if x <= first.x {
            return first.y;
        }
        if x >= last.x {
            return last.y;
        }

        // First key strictly past `x`; the bounds above keep it in 1..len.
        let right = self.keys.partition_point(|k| k.x <= x);
        let (a, b) = (&self.keys[right - 1], &self.keys[right]);
        let span = b.x - a.x;
        let t = (x - a.x) / span;
        match self.interpolation {
            CurveInterpolation::Constant => a.y,
            CurveInterpolation::Linear => lerp_f32(a.y, b.y, t),
            CurveInterpolation::Hermite => {
                let (t2, t3) = (t * t, t * t * t);
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + t;
                let h01 = -2.0 * t3 + 3.0 * t2;
                let h11 = t3 - t2;
                h00 * a.y + h10 * span * a.tangent_out + h01 * b.y + h11 * span * b.tangent_in
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn keys() -> Vec<CurveKey> {
        vec![CurveKey::new(0.0, 0.0), CurveKey::new(1.0, 2.0), CurveKey::new(3.0, 2.0)]
    }

    #[test]
    fn holds_end_values_outside_the_keys() {
        let curve = FloatCurve::new(keys(), CurveInterpolation::Hermite);
        assert_eq!(curve.evaluate(-5.0), 0.0);
        assert_eq!(curve.evaluate(10.0), 2.0);
        assert_eq!(curve.evaluate(1.0), 2.0);
    }

    #[test]
    fn interpolation_modes() {
        let linear = FloatCurve::new(keys(), CurveInterpolation::Linear);
        assert_relative_eq!(linear.evaluate(0.25), 0.5);
        let constant = FloatCurve::new(keys(), CurveInterpolation::Constant);
        assert_eq!(constant.evaluate(0.75), 0.0);

        // Flat tangents give a smoothstep between keys.
        let hermite = FloatCurve::new(keys(), CurveInterpolation::Hermite);
        assert_relative_eq!(hermite.evaluate(0.5), 1.0);
        assert_relative_eq!(hermite.evaluate(0.25), 2.0 * 0.15625);

        let mut sloped = keys();
        sloped[0].tangent_out = 2.0;
        sloped[1].tangent_in = 2.0;
        let straight = FloatCurve::new(sloped, CurveInterpolation::Hermite);
        assert_relative_eq!(straight.evaluate(0.25), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn validation() {
        assert!(FloatCurve::new(keys(), CurveInterpolation::Linear).validate().is_ok());
        assert!(FloatCurve::default().validate().is_err());

        let mut unsorted = keys();
        unsorted.swap(1, 2);
        let err = FloatCurve::new(unsorted, CurveInterpolation::Linear)
            .validate()
            .unwrap_err();
        assert_eq!(err, "key 2 does not come after key 1");

        let mut bad = keys();
        bad[1].y = f32::NAN;
        assert!(FloatCurve::new(bad, CurveInterpolation::Linear).validate().is_err());
    }
}
