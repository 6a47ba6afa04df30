//! Per-variant model fitting. All three share `logistic`'s mini-batch SGD
//! fitting loop and differ only in feature extraction.

pub mod bow;
pub mod fasttext;
pub mod hashlinear;
pub mod logistic;
