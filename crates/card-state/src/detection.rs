//! Detection state machine: AwaitingName → AwaitingNumber → Resolved.
//!
//! The state is a plain value. The session feeds it transitions proposed by
//! the match resolver or triggered by the user and keeps whatever comes back.

use card_capture::{regions, ScreenRegion};
use card_data::Supertype;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    AwaitingName,
    AwaitingNumber,
    Resolved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::AwaitingName => write!(f, "AwaitingName"),
            Phase::AwaitingNumber => write!(f, "AwaitingNumber"),
            Phase::Resolved => write!(f, "Resolved"),
        }
    }
}

/// Everything that can move the detection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    /// A card name was read (or picked manually); the printing is still open.
    NameDetected { name: String, category: Supertype },
    /// A specific printing was identified.
    EntryResolved {
        entry_id: String,
        name: String,
        category: Supertype,
    },
    /// Step back one phase. A resolved non-Pokémon goes straight back to
    /// awaiting a name since its printing was never read separately.
    Cancel,
    /// Drop everything and start over.
    CancelAll,
    /// The resolved card was added to the ledger.
    Committed,
    /// Recognized text looks like an energy card.
    EnergyHint,
    DismissEnergyHint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionState {
    pub phase: Phase,
    pub candidate_name: Option<String>,
    pub resolved_entry_id: Option<String>,
    /// Category of the candidate name, known once a name is detected
    pub category: Option<Supertype>,
    /// Advisory only; never causes a transition by itself
    pub energy_hint: bool,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `transition` is legal from the current phase.
    pub fn accepts(&self, transition: &Transition) -> bool {
        match transition {
            Transition::NameDetected { .. } => self.phase == Phase::AwaitingName,
            Transition::EntryResolved { name, .. } => match self.phase {
                Phase::AwaitingName => true,
                Phase::AwaitingNumber => self.candidate_name.as_deref() == Some(name.as_str()),
                Phase::Resolved => false,
            },
            Transition::Committed => self.phase == Phase::Resolved,
            Transition::EnergyHint => self.phase == Phase::AwaitingName,
            Transition::Cancel | Transition::CancelAll | Transition::DismissEnergyHint => true,
        }
    }

    /// Apply a transition. Illegal transitions leave the state unchanged.
    pub fn apply(self, transition: Transition) -> Self {
        if !self.accepts(&transition) {
            warn!(phase = %self.phase, ?transition, "transition_rejected");
            return self;
        }

        let from = self.phase;
        let next = match transition {
            Transition::NameDetected { name, category } => Self {
                phase: Phase::AwaitingNumber,
                candidate_name: Some(name),
                resolved_entry_id: None,
                category: Some(category),
                energy_hint: false,
            },
            Transition::EntryResolved {
                entry_id,
                name,
                category,
            } => Self {
                phase: Phase::Resolved,
                candidate_name: Some(name),
                resolved_entry_id: Some(entry_id),
                category: Some(category),
                energy_hint: false,
            },
            Transition::Cancel => match self.phase {
                Phase::Resolved if self.category.is_some_and(Supertype::is_pokemon) => Self {
                    phase: Phase::AwaitingNumber,
                    resolved_entry_id: None,
                    energy_hint: false,
                    ..self
                },
                Phase::Resolved | Phase::AwaitingNumber => Self::default(),
                Phase::AwaitingName => self,
            },
            Transition::CancelAll | Transition::Committed => Self::default(),
            Transition::EnergyHint => Self {
                energy_hint: true,
                ..self
            },
            Transition::DismissEnergyHint => Self {
                energy_hint: false,
                ..self
            },
        };

        if next.phase != from {
            info!(from = %from, to = %next.phase, "detection_transition");
        }
        next
    }

    /// Frame region sampled for recognition in the current phase.
    pub fn region_of_interest(&self) -> ScreenRegion {
        match self.phase {
            Phase::AwaitingName | Phase::AwaitingNumber => regions::text_band(),
            Phase::Resolved => regions::full_frame(),
        }
    }
}
