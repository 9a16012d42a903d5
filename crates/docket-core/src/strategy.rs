use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocketError;

/// How the extraction service segments a document before extraction.
///
/// Opaque to this crate: the value is passed through to the extraction
/// service. The profile only exists to guide operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    WholeDocument,
    FixedTruncation,
    RecursiveSplit,
    TokenBounded,
    SentenceBounded,
    SectionAware,
    SlidingWindow,
    TopicAware,
    MultiGranularity,
    ParagraphAware,
    StructureAware,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tradeoff {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub strategy: ChunkingStrategy,
    pub speed: Tradeoff,
    pub coverage: Tradeoff,
    pub summary: String,
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        ChunkingStrategy::SectionAware
    }
}

impl ChunkingStrategy {
    pub fn all() -> &'static [ChunkingStrategy] {
        &[
            ChunkingStrategy::WholeDocument,
            ChunkingStrategy::FixedTruncation,
            ChunkingStrategy::RecursiveSplit,
            ChunkingStrategy::TokenBounded,
            ChunkingStrategy::SentenceBounded,
            ChunkingStrategy::SectionAware,
            ChunkingStrategy::SlidingWindow,
            ChunkingStrategy::TopicAware,
            ChunkingStrategy::MultiGranularity,
            ChunkingStrategy::ParagraphAware,
            ChunkingStrategy::StructureAware,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::WholeDocument => "whole_document",
            ChunkingStrategy::FixedTruncation => "fixed_truncation",
            ChunkingStrategy::RecursiveSplit => "recursive_split",
            ChunkingStrategy::TokenBounded => "token_bounded",
            ChunkingStrategy::SentenceBounded => "sentence_bounded",
            ChunkingStrategy::SectionAware => "section_aware",
            ChunkingStrategy::SlidingWindow => "sliding_window",
            ChunkingStrategy::TopicAware => "topic_aware",
            ChunkingStrategy::MultiGranularity => "multi_granularity",
            ChunkingStrategy::ParagraphAware => "paragraph_aware",
            ChunkingStrategy::StructureAware => "structure_aware",
        }
    }

    pub fn profile(&self) -> StrategyProfile {
        use Tradeoff::*;
        let (speed, coverage, summary) = match self {
            ChunkingStrategy::WholeDocument => {
                (High, Low, "Single pass over the whole text; long documents overflow the model context")
            }
            ChunkingStrategy::FixedTruncation => {
                (High, Low, "Keeps only the leading part of the document")
            }
            ChunkingStrategy::RecursiveSplit => {
                (Medium, Medium, "Splits on separators of decreasing size until chunks fit")
            }
            ChunkingStrategy::TokenBounded => {
                (Medium, Medium, "Fixed token budget per chunk")
            }
            ChunkingStrategy::SentenceBounded => {
                (Medium, Medium, "Chunks end on sentence boundaries")
            }
            ChunkingStrategy::SectionAware => {
                (Medium, High, "One chunk per document section")
            }
            ChunkingStrategy::SlidingWindow => {
                (Low, High, "Overlapping windows; entities across boundaries are not lost")
            }
            ChunkingStrategy::TopicAware => {
                (Low, High, "Chunks follow topic shifts detected in the text")
            }
            ChunkingStrategy::MultiGranularity => {
                (Low, High, "Extracts at several chunk sizes and merges the results")
            }
            ChunkingStrategy::ParagraphAware => {
                (Medium, Medium, "Chunks end on paragraph boundaries")
            }
            ChunkingStrategy::StructureAware => {
                (Medium, High, "Follows headings, lists and tables of the parsed layout")
            }
        };
        StrategyProfile {
            strategy: *self,
            speed,
            coverage,
            summary: summary.to_string(),
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = DocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let strategy = match normalized.as_str() {
            "whole_document" | "whole" | "full" | "none" => ChunkingStrategy::WholeDocument,
            "fixed_truncation" | "truncate" | "truncation" | "fixed" => {
                ChunkingStrategy::FixedTruncation
            }
            "recursive_split" | "recursive" => ChunkingStrategy::RecursiveSplit,
            "token_bounded" | "token" | "tokens" => ChunkingStrategy::TokenBounded,
            "sentence_bounded" | "sentence" | "sentences" => ChunkingStrategy::SentenceBounded,
            "section_aware" | "section" | "sections" => ChunkingStrategy::SectionAware,
            "sliding_window" | "window" | "overlap" => ChunkingStrategy::SlidingWindow,
            "topic_aware" | "topic" | "semantic" => ChunkingStrategy::TopicAware,
            "multi_granularity" | "hierarchical" | "multi" => ChunkingStrategy::MultiGranularity,
            "paragraph_aware" | "paragraph" | "paragraphs" => ChunkingStrategy::ParagraphAware,
            "structure_aware" | "structure" | "structural" => ChunkingStrategy::StructureAware,
            _ => {
                return Err(DocketError::Config(format!(
                    "unknown chunking strategy '{s}'"
                )))
            }
        };
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleven_strategies() {
        assert_eq!(ChunkingStrategy::all().len(), 11);
    }

    #[test]
    fn test_as_str_parses_back() {
        for strategy in ChunkingStrategy::all() {
            assert_eq!(strategy.as_str().parse::<ChunkingStrategy>().unwrap(), *strategy);
        }
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        let json = serde_json::to_string(&ChunkingStrategy::SlidingWindow).unwrap();
        assert_eq!(json, "\"sliding_window\"");
    }

    #[test]
    fn test_aliases() {
        assert_eq!("Semantic".parse::<ChunkingStrategy>().unwrap(), ChunkingStrategy::TopicAware);
        assert_eq!(
            "sliding-window".parse::<ChunkingStrategy>().unwrap(),
            ChunkingStrategy::SlidingWindow
        );
        assert_eq!("none".parse::<ChunkingStrategy>().unwrap(), ChunkingStrategy::WholeDocument);
    }

    #[test]
    fn test_unknown_strategy() {
        assert!("by_vibes".parse::<ChunkingStrategy>().is_err());
    }

    #[test]
    fn test_profile_tradeoffs() {
        let fast = ChunkingStrategy::FixedTruncation.profile();
        let thorough = ChunkingStrategy::SlidingWindow.profile();
        assert!(fast.speed > thorough.speed);
        assert!(fast.coverage < thorough.coverage);
    }
}
