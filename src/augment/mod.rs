//! プロンプト拡張
//!
//! 優先順に並んだスキルの本文を元のプロンプトに連結する。
//! ブロック時はプロンプトの代わりにブロックメッセージを組み立てる。

pub mod augmenter;
pub mod document;
pub mod lookup;

pub use augmenter::{Augmented, PromptAugmenter};
pub use document::{SkillDocument, SkillMetadata};
pub use lookup::{InMemorySkills, SkillContentLookup, SkillDirectory};
