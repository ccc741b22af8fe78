//! Property-based tests for gq-math numerical kernels.
//!
//! Uses proptest to verify arithmetic and weight-table properties across
//! many random inputs.

use gq_math::{BigDec, ExtendedFloat, FoxGlynn, MathCtx};
use proptest::prelude::*;

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-12;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// f64 -> BigDec -> f64 is the identity for finite doubles: the
    /// decimal expansion of a binary fraction is exact.
    #[test]
    fn bigdec_f64_roundtrip(x in -1e50f64..1e50) {
        let d = BigDec::from_f64(x).unwrap();
        prop_assert_eq!(d.to_f64(), x);
    }

    /// Addition and subtraction are exact inverses.
    #[test]
    fn bigdec_add_sub_exact(a in -1e20f64..1e20, b in -1e20f64..1e20) {
        let da = BigDec::from_f64(a).unwrap();
        let db = BigDec::from_f64(b).unwrap();
        let back = da.add(&db).sub(&db);
        prop_assert_eq!(back, da);
    }

    /// Multiplication distributes over addition exactly.
    #[test]
    fn bigdec_mul_distributes(
        a in -1e10f64..1e10,
        b in -1e10f64..1e10,
        c in -1e10f64..1e10,
    ) {
        let da = BigDec::from_f64(a).unwrap();
        let db = BigDec::from_f64(b).unwrap();
        let dc = BigDec::from_f64(c).unwrap();
        let lhs = da.mul(&db.add(&dc));
        let rhs = da.mul(&db).add(&da.mul(&dc));
        prop_assert_eq!(lhs, rhs);
    }

    /// x / y * y recovers x to within the context precision.
    #[test]
    fn bigdec_div_mul_roundtrip(
        x in prop::num::f64::POSITIVE.prop_filter("normal", |v| v.is_normal() && *v < 1e100),
        y in prop::num::f64::POSITIVE.prop_filter("normal", |v| v.is_normal() && *v < 1e100),
    ) {
        let ctx = MathCtx::half_up(40);
        let dx = BigDec::from_f64(x).unwrap();
        let dy = BigDec::from_f64(y).unwrap();
        let q = dx.div(&dy, ctx).unwrap();
        let back = q.mul(&dy).to_f64();
        prop_assert!(approx_eq(back, x, 1e-12), "{} vs {}", back, x);
    }

    /// Comparison agrees with f64 comparison on exactly representable
    /// values.
    #[test]
    fn bigdec_cmp_consistent(a in -1e15f64..1e15, b in -1e15f64..1e15) {
        let da = BigDec::from_f64(a).unwrap();
        let db = BigDec::from_f64(b).unwrap();
        let expected = a.partial_cmp(&b).unwrap();
        prop_assert_eq!(da.cmp_value(&db), expected);
    }

    /// Extended-float multiplication tracks log magnitudes additively.
    #[test]
    fn extended_mul_adds_logs(a in -500.0f64..500.0, b in -500.0f64..500.0) {
        let ea = ExtendedFloat::from_log10(a);
        let eb = ExtendedFloat::from_log10(b);
        let prod = ea.mul(&eb);
        prop_assert!(approx_eq(prod.log10(), a + b, 1e-9));
    }

    /// Extended-float addition of same-magnitude values doubles them.
    #[test]
    fn extended_add_doubles(a in -500.0f64..500.0) {
        let ea = ExtendedFloat::from_log10(a);
        let sum = ea.add(&ea);
        prop_assert!(approx_eq(sum.log10(), a + 2.0f64.log10(), 1e-9));
    }

    /// Fox-Glynn: the total weight equals the exact sum of the table, and
    /// the normalised weights form a sub-probability vector within the
    /// requested accuracy.
    #[test]
    fn foxglynn_totals(lambda in 0.1f64..200.0) {
        let kappa = BigDec::allowed_error(10);
        let fg = FoxGlynn::compute(lambda, 1e-300, 1e300, &kappa).unwrap();

        let mut sum = BigDec::zero();
        for w in fg.weights() {
            sum = sum.add(w);
        }
        prop_assert_eq!(&sum, fg.total_weight());

        let norm: f64 = fg.normalised_f64().iter().sum();
        prop_assert!(approx_eq(norm, 1.0, TOL));

        prop_assert!(fg.left() <= lambda.floor() as usize);
        prop_assert!(fg.right() >= lambda.ceil() as usize);
    }

    /// Fox-Glynn weights are non-negative and unimodal around the mode.
    #[test]
    fn foxglynn_shape(lambda in 1.0f64..100.0) {
        let kappa = BigDec::allowed_error(8);
        let fg = FoxGlynn::compute(lambda, 1e-300, 1e300, &kappa).unwrap();
        let probs = fg.normalised_f64();
        let mode = lambda.floor() as usize - fg.left();

        for p in &probs {
            prop_assert!(*p >= 0.0);
        }
        for i in 0..mode {
            prop_assert!(probs[i] <= probs[i + 1] + TOL);
        }
        for i in mode..probs.len() - 1 {
            prop_assert!(probs[i] + TOL >= probs[i + 1]);
        }
    }
}
