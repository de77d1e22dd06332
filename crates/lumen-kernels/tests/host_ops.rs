//! Operation tests against the in-process host device.

use lumen_core::ops as reference;
use lumen_core::{ColumnMajor, Complex32, Complex64, Element, LumenError, Matrix, RowMajor, StorageOrder, Vector};
use lumen_kernels::ops::*;
use lumen_kernels::{DeviceHandle, DeviceMatrix, DeviceVector, QueueStats, RuntimeConfig};

fn host_handle() -> DeviceHandle {
    DeviceHandle::with_config(&RuntimeConfig::host(2)).unwrap()
}

fn int_matrix<T: Element, L: StorageOrder>(rows: usize, cols: usize, seed: usize) -> Matrix<T, L> {
    Matrix::from_fn(rows, cols, |i, j| T::from_f64(((i * 7 + j * 3 + seed) % 11) as f64 - 5.0))
}

fn int_vector<T: Element>(len: usize, seed: usize) -> Vector<T> {
    Vector::from_fn(len, |i| T::from_f64(((i * 5 + seed) % 9) as f64 - 4.0))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_a_ones_times_twos() {
    let h = host_handle();
    let a: Matrix<f32> = Matrix::from_elem(100, 100, 1.0);
    let b: Matrix<f32> = Matrix::from_elem(100, 100, 2.0);
    let c = product(&a, &b, &h).unwrap();
    assert_eq!(c.shape(), (100, 100));
    assert!(c.as_slice().iter().all(|&x| x == 200.0));
}

#[test]
fn test_scenario_b_inner_product() {
    let h = host_handle();
    let x = Vector::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0]);
    let y = Vector::from_vec(vec![5.0f32, 4.0, 3.0, 2.0, 1.0]);
    assert_eq!(inner_product(&x, &y, 0.0, &h).unwrap(), 35.0);
    assert_eq!(inner_product(&x, &y, 5.0, &h).unwrap(), 40.0);

    let dx = DeviceVector::from_host(&x, &h).unwrap();
    assert_eq!(inner_product(&dx, &y, 0.0, &h).unwrap(), 35.0);
}

#[test]
fn test_scenario_c_column_major_quotient() {
    let h = host_handle();
    let a: Matrix<f64, ColumnMajor> = Matrix::from_fn(3, 3, |i, j| (i * 3 + j + 1) as f64);

    // host round trip
    let ones = element_div(&a, &a, &h).unwrap();
    assert!(ones.as_slice().iter().all(|&x| x == 1.0));

    // device resident
    let da = DeviceMatrix::from_host(&a, &h).unwrap();
    let mut dc = DeviceMatrix::<f64, ColumnMajor>::new(1, 1, &h).unwrap();
    element_div_on_device(&da, &da, &mut dc, &h).unwrap();
    assert_eq!(dc.shape(), (3, 3));
    let back = dc.to_host().unwrap();
    assert!(back.as_slice().iter().all(|&x| x == 1.0));
}

#[test]
fn test_scenario_d_matrix_vector_shape_mismatch() {
    let h = host_handle();
    let a: Matrix<f32> = Matrix::from_elem(4, 3, 1.0);
    let b: Vector<f32> = Vector::from_elem(4, 1.0);
    let before = h.queue().stats();
    assert!(matches!(product_mv(&a, &b, &h), Err(LumenError::InvalidDimensions { .. })));
    assert_eq!(h.queue().stats(), before);

    // the same vector on the left is a valid [4] · [4x3]
    assert_eq!(product_vm(&b, &a, &h).unwrap().as_slice(), &[4.0, 4.0, 4.0]);
}

// ============================================================================
// Products across element types, layouts and residency
// ============================================================================

fn check_product_all_residencies<T: Element, L: StorageOrder>() {
    let h = host_handle();
    let a: Matrix<T, L> = int_matrix(5, 4, 1);
    let b: Matrix<T, L> = int_matrix(4, 6, 2);
    let expected = reference::prod(&a, &b).unwrap();

    let da = DeviceMatrix::from_host(&a, &h).unwrap();
    let db = DeviceMatrix::from_host(&b, &h).unwrap();

    assert_eq!(product(&a, &b, &h).unwrap(), expected);
    assert_eq!(product(&da, &b, &h).unwrap(), expected);
    assert_eq!(product(&a, &db, &h).unwrap(), expected);
    assert_eq!(product(&da, &db, &h).unwrap(), expected);

    let mut out = Matrix::zeros(1, 1);
    product_into(&a, &db, &mut out, &h).unwrap();
    assert_eq!(out, expected);

    let mut dc = DeviceMatrix::new(0, 0, &h).unwrap();
    product_on_device(&da, &db, &mut dc, &h).unwrap();
    assert_eq!(dc.to_host().unwrap(), expected);
}

#[test]
fn test_product_f32_both_layouts() {
    check_product_all_residencies::<f32, RowMajor>();
    check_product_all_residencies::<f32, ColumnMajor>();
}

#[test]
fn test_product_f64_both_layouts() {
    check_product_all_residencies::<f64, RowMajor>();
    check_product_all_residencies::<f64, ColumnMajor>();
}

#[test]
fn test_product_complex_both_layouts() {
    check_product_all_residencies::<Complex32, RowMajor>();
    check_product_all_residencies::<Complex32, ColumnMajor>();
    check_product_all_residencies::<Complex64, RowMajor>();
    check_product_all_residencies::<Complex64, ColumnMajor>();
}

#[test]
fn test_complex_product_values() {
    let h = host_handle();
    let i = Complex64::new(0.0, 1.0);
    let a: Matrix<Complex64> = Matrix::from_rows(&[&[i, Complex64::new(1.0, 0.0)]]).unwrap();
    let b: Matrix<Complex64> = Matrix::from_rows(&[&[i], &[Complex64::new(2.0, 3.0)]]).unwrap();
    let c = product(&a, &b, &h).unwrap();
    assert_eq!(c.as_slice(), &[Complex64::new(1.0, 3.0)]);
}

#[test]
fn test_matrix_vector_products() {
    let h = host_handle();
    let a: Matrix<f64, ColumnMajor> = int_matrix(4, 3, 0);
    let x: Vector<f64> = int_vector(3, 1);
    let y: Vector<f64> = int_vector(4, 2);

    assert_eq!(product_mv(&a, &x, &h).unwrap(), reference::prod_mv(&a, &x).unwrap());
    assert_eq!(product_vm(&y, &a, &h).unwrap(), reference::prod_vm(&y, &a).unwrap());

    let ar: Matrix<f64, RowMajor> = int_matrix(4, 3, 0);
    let dx = DeviceVector::from_host(&x, &h).unwrap();
    let mut dy = DeviceVector::new(0, &h).unwrap();
    product_mv_on_device(&ar, &dx, &mut dy, &h).unwrap();
    assert_eq!(dy.to_host().unwrap(), reference::prod_mv(&ar, &x).unwrap());

    let mut out = Vector::zeros(0);
    product_vm_into(&y, &ar, &mut out, &h).unwrap();
    assert_eq!(out, reference::prod_vm(&y, &ar).unwrap());
}

#[test]
fn test_outer_product_layout_from_result() {
    let h = host_handle();
    let x = Vector::from_vec(vec![1.0f32, 2.0, 3.0]);
    let y = Vector::from_vec(vec![4.0f32, 5.0]);
    let row: Matrix<f32, RowMajor> = outer_product(&x, &y, &h).unwrap();
    let col: Matrix<f32, ColumnMajor> = outer_product(&x, &y, &h).unwrap();
    assert_eq!(row, reference::outer(&x, &y));
    assert_eq!(col, reference::outer(&x, &y));
    assert_eq!(row.as_slice(), &[4.0, 5.0, 8.0, 10.0, 12.0, 15.0]);
    assert_eq!(col.as_slice(), &[4.0, 8.0, 12.0, 5.0, 10.0, 15.0]);

    let dy = DeviceVector::from_host(&y, &h).unwrap();
    let mut dc = DeviceMatrix::<f32, ColumnMajor>::new(0, 0, &h).unwrap();
    outer_product_on_device(&x, &dy, &mut dc, &h).unwrap();
    assert_eq!(dc.to_host().unwrap(), col);
}

// ============================================================================
// Element-wise
// ============================================================================

#[test]
fn test_elementwise_matrices() {
    let h = host_handle();
    let a: Matrix<f64> = int_matrix(3, 4, 0);
    let b: Matrix<f64> = Matrix::from_fn(3, 4, |i, j| (i + j + 1) as f64);

    assert_eq!(element_add(&a, &b, &h).unwrap(), reference::zip_matrix(&a, &b, |x, y| x + y).unwrap());
    assert_eq!(element_sub(&a, &b, &h).unwrap(), reference::zip_matrix(&a, &b, |x, y| x - y).unwrap());
    assert_eq!(element_mul(&a, &b, &h).unwrap(), reference::zip_matrix(&a, &b, |x, y| x * y).unwrap());
    assert_eq!(element_div(&a, &b, &h).unwrap(), reference::zip_matrix(&a, &b, |x, y| x / y).unwrap());
}

fn check_elementwise_all<T: Element, L: StorageOrder>() {
    let h = host_handle();
    let a: Matrix<T, L> = int_matrix(3, 4, 2);
    let b: Matrix<T, L> = Matrix::from_fn(3, 4, |i, j| T::from_f64((i + j + 1) as f64));
    let da = DeviceMatrix::from_host(&a, &h).unwrap();
    let db = DeviceMatrix::from_host(&b, &h).unwrap();

    let expected = [
        reference::zip_matrix(&a, &b, |x, y| x + y).unwrap(),
        reference::zip_matrix(&a, &b, |x, y| x - y).unwrap(),
        reference::zip_matrix(&a, &b, |x, y| x * y).unwrap(),
        reference::zip_matrix(&a, &b, |x, y| x / y).unwrap(),
    ];

    assert_eq!(element_add(&a, &b, &h).unwrap(), expected[0]);
    assert_eq!(element_sub(&da, &b, &h).unwrap(), expected[1]);
    assert_eq!(element_mul(&a, &db, &h).unwrap(), expected[2]);
    assert_eq!(element_div(&da, &db, &h).unwrap(), expected[3]);

    let mut out = Matrix::zeros(1, 1);
    element_add_into(&da, &db, &mut out, &h).unwrap();
    assert_eq!(out, expected[0]);
    element_div_into(&a, &db, &mut out, &h).unwrap();
    assert_eq!(out, expected[3]);

    let mut dc = DeviceMatrix::new(0, 0, &h).unwrap();
    element_sub_on_device(&da, &db, &mut dc, &h).unwrap();
    assert_eq!(dc.to_host().unwrap(), expected[1]);
    element_mul_on_device(&a, &b, &mut dc, &h).unwrap();
    assert_eq!(dc.to_host().unwrap(), expected[2]);
}

#[test]
fn test_elementwise_all_types_and_layouts() {
    check_elementwise_all::<f32, RowMajor>();
    check_elementwise_all::<f32, ColumnMajor>();
    check_elementwise_all::<f64, RowMajor>();
    check_elementwise_all::<f64, ColumnMajor>();
    check_elementwise_all::<Complex32, RowMajor>();
    check_elementwise_all::<Complex32, ColumnMajor>();
    check_elementwise_all::<Complex64, RowMajor>();
    check_elementwise_all::<Complex64, ColumnMajor>();
}

#[test]
fn test_elementwise_vectors_mixed_residency() {
    let h = host_handle();
    let a: Vector<Complex32> = Vector::from_fn(6, |i| Complex32::new(i as f32, 1.0));
    let b: Vector<Complex32> = Vector::from_fn(6, |i| Complex32::new(1.0, -(i as f32)));
    let db = DeviceVector::from_host(&b, &h).unwrap();

    let expected = reference::zip_vector(&a, &b, |x, y| x * y).unwrap();
    assert_eq!(element_mul(&a, &db, &h).unwrap(), expected);

    let mut out = Vector::zeros(1);
    element_sub_into(&db, &a, &mut out, &h).unwrap();
    assert_eq!(out, reference::zip_vector(&b, &a, |x, y| x - y).unwrap());

    let mut dc = DeviceVector::new(0, &h).unwrap();
    element_add_on_device(&a, &db, &mut dc, &h).unwrap();
    assert_eq!(dc.to_host().unwrap(), reference::zip_vector(&a, &b, |x, y| x + y).unwrap());
}

#[test]
fn test_elementwise_shape_mismatch() {
    let h = host_handle();
    let a: Matrix<f32> = Matrix::zeros(2, 3);
    let b: Matrix<f32> = Matrix::zeros(3, 2);
    assert!(matches!(element_add(&a, &b, &h), Err(LumenError::InvalidDimensions { .. })));
    let x: Vector<f32> = Vector::zeros(3);
    assert!(matches!(element_mul(&x, &Vector::<f32>::zeros(4), &h), Err(LumenError::InvalidDimensions { .. })));
    assert_eq!(h.queue().stats(), QueueStats::default());
}

// ============================================================================
// Empty extents
// ============================================================================

#[test]
fn test_product_empty_extents() {
    let h = host_handle();

    let a: Matrix<f32> = Matrix::zeros(0, 3);
    let b: Matrix<f32> = Matrix::zeros(3, 4);
    let c = product(&a, &b, &h).unwrap();
    assert_eq!(c.shape(), (0, 4));

    // K = 0 gives a zero matrix without a GEMM launch
    let a: Matrix<f32> = Matrix::zeros(2, 0);
    let b: Matrix<f32> = Matrix::zeros(0, 3);
    let before = h.queue().stats().kernel_launches;
    let c = product(&a, &b, &h).unwrap();
    assert_eq!(c, Matrix::zeros(2, 3));
    assert_eq!(h.queue().stats().kernel_launches, before);
}

#[test]
fn test_inner_product_of_empty_vectors_is_seed() {
    let h = host_handle();
    let x: Vector<f64> = Vector::zeros(0);
    assert_eq!(inner_product(&x, &x, 7.5, &h).unwrap(), 7.5);
    assert_eq!(h.queue().stats().kernel_launches, 0);
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_device_mismatch_between_handles() {
    let h1 = host_handle();
    let h2 = host_handle();
    let a: Matrix<f32> = Matrix::from_elem(2, 2, 1.0);
    let d1 = DeviceMatrix::from_host(&a, &h1).unwrap();
    let d2 = DeviceMatrix::from_host(&a, &h2).unwrap();

    assert!(matches!(product(&d1, &d2, &h1), Err(LumenError::DeviceMismatch { .. })));
    assert!(matches!(product(&d1, &a, &h2), Err(LumenError::DeviceMismatch { .. })));
    assert!(matches!(element_add(&d2, &a, &h1), Err(LumenError::DeviceMismatch { .. })));

    let mut out = DeviceMatrix::<f32>::new(2, 2, &h2).unwrap();
    assert!(matches!(
        product_on_device(&a, &a, &mut out, &h1),
        Err(LumenError::DeviceMismatch { .. })
    ));
}

#[test]
fn test_failed_call_leaves_result_untouched() {
    let h = host_handle();
    let a: Matrix<f64> = Matrix::from_elem(2, 3, 1.0);
    let sentinel: Matrix<f64> = Matrix::from_elem(5, 5, 9.0);

    let mut out = sentinel.clone();
    assert!(product_into(&a, &a, &mut out, &h).is_err());
    assert_eq!(out, sentinel);

    let mut dev = DeviceMatrix::from_host(&sentinel, &h).unwrap();
    assert!(product_on_device(&a, &a, &mut dev, &h).is_err());
    assert_eq!(dev.shape(), (5, 5));
    assert_eq!(dev.to_host().unwrap(), sentinel);
}

#[test]
fn test_device_not_found() {
    let cfg = RuntimeConfig {
        device_index: Some(2),
        ..RuntimeConfig::host(2)
    };
    assert!(matches!(
        DeviceHandle::with_config(&cfg),
        Err(LumenError::DeviceNotFound { index: 2, available: 2 })
    ));
}

#[test]
fn test_handles_on_separate_threads() {
    let workers: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let h = DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap();
                let a: Matrix<f64> = Matrix::from_elem(8, 8, t as f64);
                let b: Matrix<f64> = Matrix::from_elem(8, 8, 1.0);
                product(&a, &b, &h).unwrap()
            })
        })
        .collect();
    for (t, w) in workers.into_iter().enumerate() {
        let c = w.join().unwrap();
        assert!(c.as_slice().iter().all(|&x| x == 8.0 * t as f64));
    }
}

#[test]
fn test_random_integer_products_match_reference() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let h = host_handle();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..8 {
        let (m, k, n) = (rng.gen_range(1..12), rng.gen_range(1..12), rng.gen_range(1..12));
        let a: Matrix<f32, ColumnMajor> = Matrix::from_fn(m, k, |_, _| rng.gen_range(-6..=6) as f32);
        let b: Matrix<f32, ColumnMajor> = Matrix::from_fn(k, n, |_, _| rng.gen_range(-6..=6) as f32);
        let db = DeviceMatrix::from_host(&b, &h).unwrap();
        assert_eq!(product(&a, &db, &h).unwrap(), reference::prod(&a, &b).unwrap());
    }
}
