//! Python bindings for the MTG simulation core.
//!
//! Exposes the environment surface an RL training loop needs: build an
//! env from a deck list, read the 480-bit mask as a numpy array, and
//! step with an action index.
//!
//! # Quick Start
//!
//! ```python
//! import mtg_sim
//!
//! env = mtg_sim.PyMtgEnv(deck=[1] * 60, seed=42, max_turns=50)
//! mask = env.action_mask()          # numpy bool array, length 480
//! reward, done, truncated, info = env.step(225)  # keep hand
//! ```

use numpy::{PyArray1, ToPyArray};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::actions::ActionContext;
use crate::cards::{CardData, CardId, CardRegistry, CardType, TypeLine};
use crate::core::{ManaCost, PlayerId};
use crate::env::MtgEnv;

/// Python wrapper for the environment.
#[pyclass(name = "PyMtgEnv")]
pub struct PyMtgEnv {
    inner: MtgEnv,
}

#[pymethods]
impl PyMtgEnv {
    /// Build an environment with identical vanilla decks.
    ///
    /// Card ids must be registered; unknown ids get a 2/2 creature
    /// definition so smoke tests can run without a database.
    #[new]
    #[pyo3(signature = (deck, seed = 0, max_turns = 100))]
    fn new(deck: Vec<u32>, seed: u64, max_turns: u32) -> Self {
        let mut registry = CardRegistry::new();
        for &id in &deck {
            let card_id = CardId::new(id);
            if registry.get(card_id).is_none() {
                registry.register(
                    CardData::new(card_id, format!("Card {id}"), TypeLine::of(CardType::Creature))
                        .with_cost(ManaCost::generic(2))
                        .with_stats(2, 2),
                );
            }
        }
        let deck: Vec<CardId> = deck.into_iter().map(CardId::new).collect();
        let inner = MtgEnv::builder(registry)
            .deck(PlayerId::P1, deck.clone())
            .deck(PlayerId::P2, deck)
            .max_turns(max_turns)
            .build(seed);
        Self { inner }
    }

    /// The current action mask as a numpy bool array.
    fn action_mask<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<bool>> {
        self.inner.action_mask().to_vec().to_pyarray_bound(py)
    }

    /// Index of the player who must act (0 or 1).
    fn decision_player(&self) -> usize {
        self.inner.decision_player().index()
    }

    /// Apply an action. Returns `(reward, done, truncated, info)`.
    fn step<'py>(
        &mut self,
        py: Python<'py>,
        action: u16,
    ) -> PyResult<(f32, bool, bool, Bound<'py, PyDict>)> {
        let result = self.inner.step(action, &ActionContext::None);

        let info = PyDict::new_bound(py);
        info.set_item(
            "action_mask",
            result.info.action_mask.to_vec().to_pyarray_bound(py),
        )?;
        info.set_item("decision_player", result.info.decision_player.index())?;
        info.set_item("turn", result.info.turn)?;
        info.set_item("phase", format!("{}", result.info.phase))?;
        if let Some(outcome) = result.info.game_result {
            info.set_item("game_result", format!("{outcome:?}").to_lowercase())?;
        }
        if let Some(message) = result.info.error_message {
            info.set_item("error_message", message)?;
        }

        Ok((result.reward, result.done, result.truncated, info))
    }

    /// Reset with a new seed; returns the fresh mask.
    fn reset<'py>(&mut self, py: Python<'py>, seed: u64) -> Bound<'py, PyArray1<bool>> {
        self.inner.reset(seed).to_vec().to_pyarray_bound(py)
    }

    /// Life totals `(p1, p2)`.
    fn life_totals(&self) -> (i32, i32) {
        (
            self.inner.game.players[PlayerId::P1].life,
            self.inner.game.players[PlayerId::P2].life,
        )
    }

    fn turn(&self) -> u32 {
        self.inner.game.turn
    }

    fn __repr__(&self) -> String {
        format!(
            "PyMtgEnv(turn={}, phase={})",
            self.inner.game.turn, self.inner.game.phase
        )
    }
}

/// mtg-sim: action-mask MTG core for RL training.
#[pymodule]
fn mtg_sim(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMtgEnv>()?;
    m.add("ACTION_SPACE", crate::actions::ACTION_SPACE)?;
    Ok(())
}
