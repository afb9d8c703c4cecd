//! Memory / Context Scoper — builds a token-bounded context per turn and
//! scopes an immutable snapshot of it for mini-agents.

use serde::{Deserialize, Serialize};

const CHARS_PER_TOKEN: f32 = 4.0;

pub fn estimate_tokens(text: &str) -> usize {
    (text.len() as f32 / CHARS_PER_TOKEN).ceil() as usize
}

/// A chunk retrieved by similarity search against long-term memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// A pinned fact carried in every turn until explicitly unpinned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PinnedFact {
    pub text: String,
    pub importance: f32,
    pub recency_ms: u64,
}

/// One prior turn kept verbatim in the ephemeral window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EphemeralTurn {
    pub role: String,
    pub content: String,
}

/// Per-layer token accounting reported alongside the assembled context.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TokenReport {
    pub ephemeral: usize,
    pub retrieved: usize,
    pub knowledge: usize,
    pub query: usize,
    pub total: usize,
}

/// Assembled context for the main turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssembledContext {
    pub ephemeral: Vec<EphemeralTurn>,
    pub retrieved: Vec<RetrievedChunk>,
    pub knowledge: Vec<PinnedFact>,
    pub query: String,
    pub report: TokenReport,
}

/// Immutable view of context scoped down for a mini-agent. Holds owned data
/// only — no reference back to the parent's context manager — so a child
/// cannot observe or widen what it was given after the fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopedContext {
    pub relevant_files: Vec<String>,
    pub search_patterns: Vec<String>,
    pub domain_knowledge: Vec<String>,
    pub excluded_context: Vec<String>,
    pub max_tokens: usize,
    pub session_id: String,
    pub parent_context: String,
}

pub struct MemoryScoper {
    max_ephemeral_turns: usize,
    ephemeral_budget: usize,
    retrieved_budget: usize,
    knowledge_budget: usize,
}

impl Default for MemoryScoper {
    fn default() -> Self {
        Self {
            max_ephemeral_turns: 20,
            ephemeral_budget: 4000,
            retrieved_budget: 4000,
            knowledge_budget: 1000,
        }
    }
}

impl MemoryScoper {
    pub fn new(max_ephemeral_turns: usize, ephemeral_budget: usize, retrieved_budget: usize, knowledge_budget: usize) -> Self {
        Self {
            max_ephemeral_turns,
            ephemeral_budget,
            retrieved_budget,
            knowledge_budget,
        }
    }

    /// Merge ephemeral turns (most recent first, capped by count then by
    /// token budget), similarity-scored retrieved chunks (top-K within
    /// budget), and importance/recency-sorted pinned facts, into one
    /// assembled context for the main turn.
    pub fn assemble(
        &self,
        query: &str,
        mut turns: Vec<EphemeralTurn>,
        mut chunks: Vec<RetrievedChunk>,
        mut facts: Vec<PinnedFact>,
    ) -> AssembledContext {
        if turns.len() > self.max_ephemeral_turns {
            let drop = turns.len() - self.max_ephemeral_turns;
            turns.drain(0..drop);
        }
        let mut ephemeral = Vec::new();
        let mut ephemeral_tokens = 0;
        for turn in turns.into_iter().rev() {
            let t = estimate_tokens(&turn.content);
            if ephemeral_tokens + t > self.ephemeral_budget {
                break;
            }
            ephemeral_tokens += t;
            ephemeral.push(turn);
        }
        ephemeral.reverse();

        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let mut retrieved = Vec::new();
        let mut retrieved_tokens = 0;
        for chunk in chunks {
            let t = estimate_tokens(&chunk.text);
            if retrieved_tokens + t > self.retrieved_budget {
                continue;
            }
            retrieved_tokens += t;
            retrieved.push(chunk);
        }

        facts.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.recency_ms.cmp(&a.recency_ms))
        });
        let mut knowledge = Vec::new();
        let mut knowledge_tokens = 0;
        for fact in facts {
            let t = estimate_tokens(&fact.text);
            if knowledge_tokens + t > self.knowledge_budget {
                continue;
            }
            knowledge_tokens += t;
            knowledge.push(fact);
        }

        let query_tokens = estimate_tokens(query);
        let report = TokenReport {
            ephemeral: ephemeral_tokens,
            retrieved: retrieved_tokens,
            knowledge: knowledge_tokens,
            query: query_tokens,
            total: ephemeral_tokens + retrieved_tokens + knowledge_tokens + query_tokens,
        };

        AssembledContext {
            ephemeral,
            retrieved,
            knowledge,
            query: query.to_string(),
            report,
        }
    }

    /// Produce an immutable, owned snapshot scoped for a single mini-agent.
    pub fn scope_for_agent(
        &self,
        session_id: &str,
        relevant_files: Vec<String>,
        search_patterns: Vec<String>,
        ctx: &AssembledContext,
        max_tokens: usize,
    ) -> ScopedContext {
        let domain_knowledge = ctx.knowledge.iter().map(|f| f.text.clone()).collect();
        let parent_context = ctx
            .retrieved
            .iter()
            .map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join("\n---\n");
        ScopedContext {
            relevant_files,
            search_patterns,
            domain_knowledge,
            excluded_context: Vec::new(),
            max_tokens,
            session_id: session_id.to_string(),
            parent_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_matches_ceil_chars_over_four() {
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn retrieved_chunks_are_ranked_by_score() {
        let scoper = MemoryScoper::default();
        let chunks = vec![
            RetrievedChunk { id: "a".into(), text: "low".into(), score: 0.2 },
            RetrievedChunk { id: "b".into(), text: "high".into(), score: 0.9 },
        ];
        let ctx = scoper.assemble("q", Vec::new(), chunks, Vec::new());
        assert_eq!(ctx.retrieved[0].id, "b");
    }

    #[test]
    fn report_components_sum_to_total() {
        let scoper = MemoryScoper::default();
        let ctx = scoper.assemble(
            "what changed",
            vec![EphemeralTurn { role: "user".into(), content: "hi".into() }],
            vec![],
            vec![PinnedFact { text: "fact".into(), importance: 1.0, recency_ms: 0 }],
        );
        let r = ctx.report;
        assert_eq!(r.total, r.ephemeral + r.retrieved + r.knowledge + r.query);
    }

    #[test]
    fn scoped_context_is_an_owned_snapshot() {
        let scoper = MemoryScoper::default();
        let ctx = scoper.assemble("q", vec![], vec![], vec![]);
        let scoped = scoper.scope_for_agent("s1", vec!["a.rs".into()], vec![], &ctx, 1000);
        assert_eq!(scoped.session_id, "s1");
        assert_eq!(scoped.max_tokens, 1000);
    }
}
