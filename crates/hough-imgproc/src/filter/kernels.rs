/// Number of taps needed to cover `±3 sigma` of a gaussian, always odd.
///
/// A non-positive sigma yields a single tap.
pub fn kernel_size_from_sigma(sigma: f32) -> usize {
    if sigma.is_nan() || sigma <= 0.0 {
        return 1;
    }
    2 * (3.0 * sigma).ceil() as usize + 1
}

/// Create a gaussian blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// # Returns
///
/// A vector of the kernel. A non-positive sigma yields the identity kernel.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    if sigma.is_nan() || sigma <= 0.0 || kernel_size <= 1 {
        return vec![1.0];
    }

    let mut kernel = Vec::with_capacity(kernel_size);

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    // compute the kernel
    for i in 0..kernel_size {
        let x = i as f32 - mean;
        kernel.push((-(x * x) / (2.0 * sigma_sq)).exp());
    }

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}

/// Create a first order gaussian derivative kernel.
///
/// The kernel is laid out for correlation (the filters in this crate do not flip kernels)
/// and normalized so that a unit slope ramp produces a response of exactly one.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// # Returns
///
/// A vector of the kernel. A non-positive sigma yields the central difference kernel.
pub fn gaussian_derivative_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    if sigma.is_nan() || sigma <= 0.0 || kernel_size < 3 {
        return vec![-0.5, 0.0, 0.5];
    }

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    let mut kernel = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - mean;
            x * (-(x * x) / (2.0 * sigma_sq)).exp()
        })
        .collect::<Vec<_>>();

    // sum_i k_i * x_i must be one
    let norm = kernel
        .iter()
        .enumerate()
        .map(|(i, k)| k * (i as f32 - mean))
        .sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}
