//! Expansion reasoner: one bounded consultation of the hypothesis source per round.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::models::{ExpansionDecision, RunState};
use crate::domain::ports::{HypothesisSource, ReasoningRequest};

pub struct ExpansionReasoner {
    source: Arc<dyn HypothesisSource>,
    top_n: usize,
    max_rounds: u32,
}

impl ExpansionReasoner {
    pub fn new(source: Arc<dyn HypothesisSource>, top_n: usize, max_rounds: u32) -> Self {
        Self {
            source,
            top_n,
            max_rounds,
        }
    }

    /// Same source and top-N, different cap.
    pub fn with_max_rounds(&self, max_rounds: u32) -> Self {
        Self {
            source: Arc::clone(&self.source),
            top_n: self.top_n,
            max_rounds,
        }
    }

    pub const fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Whether `round` has hit the hard cap, after which only `proceed` is possible.
    pub const fn is_capped(&self, round: u32) -> bool {
        round > self.max_rounds
    }

    /// Summary sent to the hypothesis source: the top-N results, never all of them.
    pub fn request_for(&self, state: &RunState) -> ReasoningRequest {
        ReasoningRequest {
            subject: state.subject.clone(),
            round: state.round,
            max_rounds: self.max_rounds,
            top_results: state
                .top_results(self.top_n)
                .into_iter()
                .cloned()
                .collect(),
            total_results: state.accumulated_results.len(),
            targets: state.targets.iter().map(|t| t.id.clone()).collect(),
            history: state.expansion_history.clone(),
            hypotheses: state.hypotheses.clone(),
        }
    }

    /// Obtain a normalized, cap-enforced decision for the current round.
    ///
    /// Never fails: an unreachable or incoherent source yields `proceed`.
    pub async fn decide(&self, state: &RunState) -> ExpansionDecision {
        let round = state.round;
        let request = self.request_for(state);

        let decision = match self.source.decide(&request).await {
            Ok(payload) => ExpansionDecision::from_payload(round, &payload),
            Err(e) => {
                warn!(round, error = %e, "hypothesis source failed, defaulting to proceed");
                ExpansionDecision::proceed(
                    round,
                    format!("Reasoning unavailable ({e}); proceeding with current results."),
                )
            }
        };

        if self.is_capped(round) {
            decision.cap(self.max_rounds)
        } else {
            decision
        }
    }

    /// Decide and log the decision on the run: one hypothesis and one history entry.
    #[instrument(skip(self, state), fields(round = state.round))]
    pub async fn evaluate(&self, state: &mut RunState) -> ExpansionDecision {
        let decision = self.decide(state).await;
        info!(
            action = %decision.action,
            rationale = %decision.rationale,
            hypothesis = %decision.hypothesis,
            "expansion decision"
        );
        state.record_decision(&decision);
        decision
    }
}
