//! ポリシー解決
//!
//! マッチしたルールの強制アクションを block > warn > suggest > none の順で集約し、
//! 優先度の重み（critical=1000, high=100, medium=10, low=1）でスキルを並べる。

pub mod resolver;

pub use resolver::{resolve, Action, Resolution};
