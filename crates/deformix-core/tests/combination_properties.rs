mod common;

use std::sync::Arc;
use common::{
    bspline_2d, init_tracing, knot_distance, numeric_spatial_hessian, numeric_spatial_jacobian,
};
use deformix_core::spatial::{Point, Vector};
use deformix_core::transform::{Jacobian, SpatialHessian, SpatialJacobian};
use deformix_core::{
    AdvancedTransform, AffineTransform, CombinationMode, CombinationTransform, SharedTransform,
    TransformError, TranslationTransform, VersorRigid3DTransform,
};
use nalgebra::SMatrix;
use proptest::prelude::*;

fn deformable_pair(mode: CombinationMode) -> CombinationTransform<2> {
    deformable_pair_with_initial_order(mode, 3)
}

/// Cubic current transform on top of an axis-aligned initial spline of the given order.
fn deformable_pair_with_initial_order(mode: CombinationMode, order: usize) -> CombinationTransform<2> {
    let initial: SharedTransform<2> = Arc::new(bspline_2d(12, -6.0, 1.2, 0.0, order, 0.25, 0.1));
    let current: SharedTransform<2> = Arc::new(bspline_2d(14, -8.0, 1.3, 0.2, 3, 0.3, 1.7));
    CombinationTransform::with_transforms(Some(initial), current, mode)
}

/// Keeps finite differences of low-order initial splines off their knot lines.
fn clear_of_initial_knots(p: &Point<2>) -> bool {
    (0..2).all(|axis| knot_distance((p[axis] + 6.0) / 1.2) > 1e-3)
}

fn assert_hessian_close(analytic: &SpatialHessian<2>, numeric: &SpatialHessian<2>, tolerance: f64) {
    for d in 0..2 {
        assert!(
            (analytic[d] - numeric[d]).amax() < tolerance,
            "sh[{}] analytic {} numeric {}",
            d,
            analytic[d],
            numeric[d]
        );
    }
}

proptest! {
    #[test]
    fn identity_initial_leaves_current_unchanged(x in -2.0f64..2.0, y in -2.0f64..2.0) {
        let current: SharedTransform<2> = Arc::new(bspline_2d(14, -8.0, 1.3, 0.2, 3, 0.3, 1.7));
        let identity: SharedTransform<2> = Arc::new(TranslationTransform::<2>::identity());
        let p = Point::new([x, y]);
        let direct = current.transform_point(&p).unwrap();

        for mode in [CombinationMode::Composition, CombinationMode::Addition] {
            let combination = CombinationTransform::with_transforms(
                Some(Arc::clone(&identity)),
                Arc::clone(&current),
                mode,
            );
            prop_assert_eq!(combination.transform_point(&p).unwrap(), direct);
        }
    }

    #[test]
    fn composition_spatial_jacobian_matches_finite_difference(x in -2.0f64..2.0, y in -2.0f64..2.0) {
        let combination = deformable_pair(CombinationMode::Composition);
        let p = Point::new([x, y]);
        let analytic = combination.spatial_jacobian(&p).unwrap();
        let numeric = numeric_spatial_jacobian(|q| combination.transform_point(q).unwrap(), &p, 1e-5);
        prop_assert!((analytic - numeric).amax() < 1e-5);

        let initial = combination.initial_transform().unwrap();
        let current = combination.current_transform().unwrap();
        let chained = current.spatial_jacobian(&initial.transform_point(&p).unwrap()).unwrap()
            * initial.spatial_jacobian(&p).unwrap();
        prop_assert!((analytic - chained).amax() < 1e-12);
    }

    #[test]
    fn addition_spatial_jacobian_matches_finite_difference(x in -2.0f64..2.0, y in -2.0f64..2.0) {
        let combination = deformable_pair(CombinationMode::Addition);
        let p = Point::new([x, y]);
        let analytic = combination.spatial_jacobian(&p).unwrap();
        let numeric = numeric_spatial_jacobian(|q| combination.transform_point(q).unwrap(), &p, 1e-5);
        prop_assert!((analytic - numeric).amax() < 1e-5);

        let initial = combination.initial_transform().unwrap();
        let current = combination.current_transform().unwrap();
        let summed = initial.spatial_jacobian(&p).unwrap() + current.spatial_jacobian(&p).unwrap()
            - SpatialJacobian::<2>::identity();
        prop_assert!((analytic - summed).amax() < 1e-12);
    }

    #[test]
    fn composition_spatial_hessian_matches_finite_difference(
        x in -2.0f64..2.0,
        y in -2.0f64..2.0,
        order in 1usize..=3,
    ) {
        let p = Point::new([x, y]);
        prop_assume!(clear_of_initial_knots(&p));
        let combination = deformable_pair_with_initial_order(CombinationMode::Composition, order);
        let sh = combination.spatial_hessian(&p).unwrap();
        let numeric = numeric_spatial_hessian(|q| combination.spatial_jacobian(q).unwrap(), &p, 1e-5);
        for d in 0..2 {
            prop_assert!((sh[d] - numeric[d]).amax() < 1e-4);
        }

        let mut fused = [SMatrix::<f64, 2, 2>::zeros(); 2];
        combination
            .jacobian_of_spatial_hessian_with_spatial_hessian(&p, &mut fused, &mut Vec::new(), &mut Vec::new())
            .unwrap();
        for d in 0..2 {
            prop_assert!((fused[d] - sh[d]).amax() < 1e-12);
        }
    }

    #[test]
    fn addition_spatial_hessian_matches_finite_difference(
        x in -2.0f64..2.0,
        y in -2.0f64..2.0,
        order in 1usize..=3,
    ) {
        let p = Point::new([x, y]);
        prop_assume!(clear_of_initial_knots(&p));
        let combination = deformable_pair_with_initial_order(CombinationMode::Addition, order);
        let sh = combination.spatial_hessian(&p).unwrap();
        let numeric = numeric_spatial_hessian(|q| combination.spatial_jacobian(q).unwrap(), &p, 1e-5);
        for d in 0..2 {
            prop_assert!((sh[d] - numeric[d]).amax() < 1e-4);
        }

        let sh0 = combination.initial_transform().unwrap().spatial_hessian(&p).unwrap();
        let sh1 = combination.current_transform().unwrap().spatial_hessian(&p).unwrap();
        let mut fused = [SMatrix::<f64, 2, 2>::zeros(); 2];
        combination
            .jacobian_of_spatial_hessian_with_spatial_hessian(&p, &mut fused, &mut Vec::new(), &mut Vec::new())
            .unwrap();
        for d in 0..2 {
            prop_assert!((sh[d] - (sh0[d] + sh1[d])).amax() < 1e-12);
            prop_assert!((fused[d] - sh[d]).amax() < 1e-12);
        }
    }

    #[test]
    fn nonzero_indices_agree_across_queries(x in -2.0f64..2.0, y in -2.0f64..2.0) {
        for mode in [CombinationMode::Composition, CombinationMode::Addition] {
            let combination = deformable_pair(mode);
            let p = Point::new([x, y]);
            let mut jacobian = Jacobian::zeros(0, 0);
            let mut a = Vec::new();
            combination.jacobian(&p, &mut jacobian, &mut a).unwrap();
            let mut b = Vec::new();
            combination.jacobian_of_spatial_jacobian(&p, &mut Vec::new(), &mut b).unwrap();
            let mut c = Vec::new();
            combination.jacobian_of_spatial_hessian(&p, &mut Vec::new(), &mut c).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&a, &c);
        }
    }
}

#[test]
fn composition_parameter_derivatives_match_perturbation() {
    init_tracing();
    for order in 1..=3 {
        check_parameter_derivatives(deformable_pair_with_initial_order(CombinationMode::Composition, order));
    }
}

#[test]
fn linear_initial_keeps_composite_hessian_correction() {
    let combination = deformable_pair_with_initial_order(CombinationMode::Composition, 1);
    let initial = combination.initial_transform().unwrap();
    assert!(initial.has_nonzero_spatial_hessian().unwrap());

    let p = Point::new([0.37, -0.41]);
    let sh0 = initial.spatial_hessian(&p).unwrap();
    assert!(sh0.iter().any(|hessian| hessian.amax() > 1e-3));

    let sh = combination.spatial_hessian(&p).unwrap();
    let numeric = numeric_spatial_hessian(|q| combination.spatial_jacobian(q).unwrap(), &p, 1e-5);
    assert_hessian_close(&sh, &numeric, 1e-4);
}

fn check_parameter_derivatives(mut combination: CombinationTransform<2>) {
    let p = Point::new([0.4, -0.7]);

    let mut jacobian = Jacobian::zeros(0, 0);
    let mut indices = Vec::new();
    combination.jacobian(&p, &mut jacobian, &mut indices).unwrap();
    let mut sj = SpatialJacobian::zeros();
    let mut jsj = Vec::new();
    let mut jsj_indices = Vec::new();
    combination
        .jacobian_of_spatial_jacobian_with_spatial_jacobian(&p, &mut sj, &mut jsj, &mut jsj_indices)
        .unwrap();
    let mut sh = [SMatrix::<f64, 2, 2>::zeros(); 2];
    let mut jsh = Vec::new();
    let mut jsh_indices = Vec::new();
    combination
        .jacobian_of_spatial_hessian_with_spatial_hessian(&p, &mut sh, &mut jsh, &mut jsh_indices)
        .unwrap();

    assert!((sj - combination.spatial_jacobian(&p).unwrap()).amax() < 1e-12);
    let reference_sh = combination.spatial_hessian(&p).unwrap();
    for d in 0..2 {
        assert!((sh[d] - reference_sh[d]).amax() < 1e-12);
    }

    let base = combination.parameters().unwrap();
    let reference_point = combination.transform_point(&p).unwrap();
    for (column, &index) in indices.iter().enumerate().step_by(3) {
        let mut bumped = base.clone();
        bumped[index] += 1.0;
        combination.set_parameters(&bumped).unwrap();
        let moved = combination.transform_point(&p).unwrap();
        let moved_sj = combination.spatial_jacobian(&p).unwrap();
        let moved_sh = combination.spatial_hessian(&p).unwrap();
        combination.set_parameters(&base).unwrap();

        for d in 0..2 {
            assert!((moved[d] - reference_point[d] - jacobian[(d, column)]).abs() < 1e-10);
            assert!(((moved_sh[d] - reference_sh[d]) - jsh[column][d]).amax() < 1e-9);
        }
        assert!(((moved_sj - sj) - jsj[column]).amax() < 1e-10);
    }
}

#[test]
fn image_gradient_product_is_evaluated_at_mapped_point() {
    let combination = deformable_pair(CombinationMode::Composition);
    let p = Point::new([1.1, 0.3]);
    let gradient = Vector::new([0.5, -2.0]);

    let mut product = Vec::new();
    let mut indices = Vec::new();
    combination
        .evaluate_jacobian_with_image_gradient_product(&p, &gradient, &mut product, &mut indices)
        .unwrap();

    let mut jacobian = Jacobian::zeros(0, 0);
    let mut jacobian_indices = Vec::new();
    combination.jacobian(&p, &mut jacobian, &mut jacobian_indices).unwrap();
    assert_eq!(indices, jacobian_indices);
    for (k, value) in product.iter().enumerate() {
        assert!((value - jacobian.column(k).dot(&gradient.0)).abs() < 1e-12);
    }
}

#[test]
fn every_query_requires_a_current_transform() {
    let mut combination = CombinationTransform::<2>::new();
    combination.set_initial_transform(Some(Arc::new(TranslationTransform::<2>::identity())));
    let p = Point::new([0.0, 0.0]);
    let expected = TransformError::NoCurrentTransform;

    assert_eq!(combination.number_of_parameters(), Err(expected.clone()));
    assert_eq!(combination.parameters(), Err(expected.clone()));
    assert_eq!(combination.number_of_nonzero_jacobian_indices(), Err(expected.clone()));
    assert_eq!(combination.has_nonzero_spatial_hessian(), Err(expected.clone()));
    assert_eq!(combination.transform_point(&p), Err(expected.clone()));
    assert_eq!(combination.spatial_jacobian(&p), Err(expected.clone()));
    assert_eq!(combination.spatial_hessian(&p), Err(expected.clone()));
    assert_eq!(
        combination.jacobian(&p, &mut Jacobian::zeros(0, 0), &mut Vec::new()),
        Err(expected.clone())
    );
    assert_eq!(
        combination.evaluate_jacobian_with_image_gradient_product(
            &p,
            &Vector::zeros(),
            &mut Vec::new(),
            &mut Vec::new()
        ),
        Err(expected.clone())
    );
    assert_eq!(
        combination.jacobian_of_spatial_jacobian(&p, &mut Vec::new(), &mut Vec::new()),
        Err(expected.clone())
    );
    assert_eq!(
        combination.jacobian_of_spatial_hessian(&p, &mut Vec::new(), &mut Vec::new()),
        Err(expected.clone())
    );
    assert_eq!(combination.set_parameters(&[]), Err(expected.clone()));
    assert!(matches!(combination.inverse(), Err(TransformError::NoCurrentTransform)));
}

#[test]
fn addition_inverse_is_unsupported() {
    let initial: SharedTransform<2> = Arc::new(TranslationTransform::new(Vector::new([1.0, 2.0])));
    let current: SharedTransform<2> = Arc::new(TranslationTransform::new(Vector::new([-1.0, 0.5])));
    let combination = CombinationTransform::with_transforms(Some(initial), current, CombinationMode::Addition);
    assert!(combination.inverse().unwrap().is_none());
    assert!(matches!(combination.try_inverse(), Err(TransformError::UnsupportedInverse(_))));
}

#[test]
fn composition_inverse_roundtrips_rigid_and_affine() {
    let rigid: SharedTransform<3> = Arc::new(VersorRigid3DTransform::new(
        [0.1, -0.2, 0.05],
        Vector::new([3.0, -1.0, 2.0]),
        Point::new([10.0, 10.0, 10.0]),
    ));
    let affine: SharedTransform<3> = Arc::new(AffineTransform::new(
        SMatrix::<f64, 3, 3>::new(1.1, 0.1, 0.0, -0.05, 0.95, 0.2, 0.0, 0.1, 1.2),
        Vector::new([0.5, 0.0, -0.5]),
        Point::new([1.0, 2.0, 3.0]),
    ));
    let combination = CombinationTransform::with_transforms(Some(rigid), affine, CombinationMode::Composition);
    let inverse = combination.try_inverse().unwrap();

    for p in [Point::new([0.0, 0.0, 0.0]), Point::new([5.0, -3.0, 12.0]), Point::new([-7.5, 1.0, 2.0])] {
        let back = inverse.transform_point(&combination.transform_point(&p).unwrap()).unwrap();
        assert!(back.max_abs_diff(&p) < 1e-10);
    }
}

#[test]
fn non_invertible_factor_yields_no_inverse() {
    let deformable: SharedTransform<2> = Arc::new(bspline_2d(8, -4.0, 1.0, 0.0, 3, 0.1, 0.0));
    let shift: SharedTransform<2> = Arc::new(TranslationTransform::new(Vector::new([1.0, 0.0])));
    let combination = CombinationTransform::with_transforms(Some(shift), deformable, CombinationMode::Composition);
    assert!(combination.inverse().unwrap().is_none());
}

#[test]
fn nested_chain_is_traversed_through_the_initial_slot() {
    let leaf: SharedTransform<2> = Arc::new(TranslationTransform::new(Vector::new([1.0, 0.0])));
    let mut inner = CombinationTransform::<2>::new();
    inner.set_current_transform(Some(leaf));
    assert_eq!(inner.number_of_transforms(), 1);

    let middle = CombinationTransform::with_transforms(
        Some(Arc::new(inner)),
        Arc::new(TranslationTransform::new(Vector::new([0.0, 1.0]))),
        CombinationMode::Composition,
    );
    let outer = CombinationTransform::with_transforms(
        Some(Arc::new(middle)),
        Arc::new(TranslationTransform::new(Vector::new([0.0, 0.0]))),
        CombinationMode::Composition,
    );
    assert_eq!(outer.number_of_transforms(), 3);
    let last = outer.nth_transform(2).unwrap();
    assert_eq!(last.parameters().unwrap(), vec![1.0, 0.0]);
    assert!(outer.nth_transform(3).is_err());
    assert_eq!(outer.transform_point(&Point::new([0.0, 0.0])).unwrap(), Point::new([1.0, 1.0]));
}
