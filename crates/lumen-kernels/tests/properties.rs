//! Property tests: device results agree exactly with the host reference on
//! small integer-valued operands.

use lumen_core::ops as reference;
use lumen_core::{ColumnMajor, LumenError, Matrix, RowMajor, Vector};
use lumen_kernels::ops::*;
use lumen_kernels::{DeviceHandle, DeviceMatrix, DeviceVector, RuntimeConfig};
use proptest::prelude::*;

fn handle() -> DeviceHandle {
    DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap()
}

fn values(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((-8i32..=8).prop_map(f64::from), len)
}

fn dims_and_data() -> impl Strategy<Value = (usize, usize, usize, Vec<f64>, Vec<f64>)> {
    (0usize..7, 0usize..7, 0usize..7).prop_flat_map(|(m, k, n)| {
        (Just(m), Just(k), Just(n), values(m * k), values(k * n))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_host_device_round_trip(rows in 0usize..9, cols in 0usize..9, seed in 0u64..1000) {
        let h = handle();
        let a: Matrix<f32, ColumnMajor> =
            Matrix::from_fn(rows, cols, |i, j| ((i as u64 * 31 + j as u64 * 17 + seed) % 13) as f32);
        let d = DeviceMatrix::from_host(&a, &h).unwrap();
        prop_assert_eq!(d.shape(), a.shape());
        prop_assert_eq!(d.to_host().unwrap(), a);
    }

    #[test]
    fn prop_product_matches_reference((m, k, n, da, db) in dims_and_data()) {
        let h = handle();
        let a: Matrix<f64, RowMajor> = Matrix::from_vec(m, k, da).unwrap();
        let b: Matrix<f64, RowMajor> = Matrix::from_vec(k, n, db).unwrap();
        let expected = reference::prod(&a, &b).unwrap();

        let staged = product(&a, &b, &h).unwrap();
        prop_assert_eq!(&staged, &expected);

        let dev_a = DeviceMatrix::from_host(&a, &h).unwrap();
        let dev_b = DeviceMatrix::from_host(&b, &h).unwrap();
        let mut out = DeviceMatrix::new(0, 0, &h).unwrap();
        product_on_device(&dev_a, &dev_b, &mut out, &h).unwrap();
        prop_assert_eq!(out.to_host().unwrap(), expected);
    }

    #[test]
    fn prop_inner_product_matches_reference(xs in values(12), ys in values(12), seed in -10i32..10) {
        let h = handle();
        let x = Vector::from_vec(xs);
        let y = Vector::from_vec(ys);
        let seed = f64::from(seed);
        let dx = DeviceVector::from_host(&x, &h).unwrap();
        prop_assert_eq!(
            inner_product(&dx, &y, seed, &h).unwrap(),
            reference::inner(&x, &y, seed).unwrap()
        );
    }

    #[test]
    fn prop_elementwise_add_commutes(data in values(20)) {
        let h = handle();
        let a: Matrix<f64> = Matrix::from_vec(4, 5, data.clone()).unwrap();
        let b: Matrix<f64> = Matrix::from_vec(4, 5, data.into_iter().rev().collect()).unwrap();
        prop_assert_eq!(element_add(&a, &b, &h).unwrap(), element_add(&b, &a, &h).unwrap());
    }

    #[test]
    fn prop_mismatched_inner_dimension_rejected(m in 1usize..6, k in 1usize..6, extra in 1usize..4, n in 1usize..6) {
        let h = handle();
        let a: Matrix<f32> = Matrix::zeros(m, k);
        let b: Matrix<f32> = Matrix::zeros(k + extra, n);
        let before = h.queue().stats();
        let is_invalid = matches!(product(&a, &b, &h), Err(LumenError::InvalidDimensions { .. }));
        prop_assert!(is_invalid);
        prop_assert_eq!(h.queue().stats(), before);
    }

    #[test]
    fn prop_foreign_operand_rejected(rows in 1usize..5, cols in 1usize..5) {
        let h1 = handle();
        let h2 = handle();
        let a: Matrix<f32> = Matrix::from_elem(rows, cols, 1.0);
        let d = DeviceMatrix::from_host(&a, &h2).unwrap();
        let is_mismatch = matches!(element_mul(&d, &a, &h1), Err(LumenError::DeviceMismatch { .. }));
        prop_assert!(is_mismatch);
    }
}
