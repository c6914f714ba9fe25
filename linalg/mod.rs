pub mod faer_ndarray;
pub mod mcca;
pub mod regression;
