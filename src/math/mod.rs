//! Numerical kernels: normal transforms, seeded random streams, and
//! correlation factorization.

pub mod correlation;
pub mod fast_norm;
pub mod fast_rng;

pub use correlation::{
    cholesky_lower_psd, correlate_normals, factor_correlation_matrix, CorrelationFactor,
};
pub use fast_norm::{norm_cdf, norm_inv_cdf, norm_pdf};
pub use fast_rng::{
    sample_standard_normal, stream_rng, stream_seed, SplitMix64, StreamChannel,
    Xoshiro256PlusPlus,
};
