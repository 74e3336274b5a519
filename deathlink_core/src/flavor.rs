//! Flavor text for outgoing death links.
//!
//! Purely cosmetic: the composed line becomes the `cause` other players see.

use crate::error::DeathLinkError;
use deathlink_env::DeathCategory;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Candidate message suffixes per death category.
///
/// Invariants (checked by [`FlavorTable::new`]):
/// - `DeathCategory::Default` has an entry, used for unmapped categories
/// - no entry is empty
#[derive(Debug, Clone)]
pub struct FlavorTable {
    lines: HashMap<DeathCategory, Vec<String>>,
}

impl FlavorTable {
    /// Builds a table from custom lines.
    pub fn new(lines: HashMap<DeathCategory, Vec<String>>) -> Result<Self, DeathLinkError> {
        if !lines.contains_key(&DeathCategory::Default) {
            return Err(DeathLinkError::InvalidFlavorTable(
                "no Default entry to fall back on".to_string(),
            ));
        }
        if let Some((category, _)) = lines.iter().find(|(_, candidates)| candidates.is_empty()) {
            return Err(DeathLinkError::InvalidFlavorTable(format!(
                "{} has no lines",
                category
            )));
        }
        Ok(Self { lines })
    }

    /// The stock table, one entry for every category.
    pub fn standard() -> Self {
        let entries: [(DeathCategory, &[&str]); 15] = [
            (
                DeathCategory::Default,
                &[
                    " became one with the universe.",
                    " stubbed their toe on a fascinating rock.",
                    " made an oopsie.",
                ],
            ),
            (
                DeathCategory::Impact,
                &[
                    " should've slowed down.",
                    " checked for fall damage.",
                    " didn’t bounce.",
                ],
            ),
            (
                DeathCategory::Asphyxiation,
                &[" forgot to hug a tree.", " forgot their spacesuit."],
            ),
            (
                DeathCategory::Energy,
                &[
                    " experienced nuclear fusion firsthand.",
                    " forgot to turn off auto pilot.",
                    " became the marshmallow.",
                    " isn't a hotshot.",
                ],
            ),
            (
                DeathCategory::Supernova,
                &[
                    " roasted all the marshmallows.",
                    " experienced astrophysics firsthand.",
                ],
            ),
            (
                DeathCategory::Digestion,
                &[
                    " did some hands on biology.",
                    " touched da fishy.",
                    " was eaten by Ernesto.",
                ],
            ),
            (
                DeathCategory::BigBang,
                &["'s garage band got out of control.", " started a sitcom."],
            ),
            (DeathCategory::Crushed, &[" became a pancake."]),
            (
                DeathCategory::Meditation,
                &[" took a long nap.", " didn’t set an alarm."],
            ),
            (
                DeathCategory::TimeLoop,
                &[" wasn’t watching the clock.", " couldn’t escape."],
            ),
            (
                DeathCategory::Lava,
                &[" will be back.", " caught the ring.", " went for a swim."],
            ),
            (
                DeathCategory::BlackHole,
                &[" was spaghettified.", " didn’t come out the other side."],
            ),
            (
                DeathCategory::Dream,
                &[" underestimated the astral plane.", " made a new friend."],
            ),
            (
                DeathCategory::DreamExplosion,
                &[
                    " learned why product recalls are important.",
                    " did some QA testing.",
                ],
            ),
            (
                DeathCategory::CrushedByElevator,
                &[" became a Flat Hearther.", " didn’t look up."],
            ),
        ];

        let lines: HashMap<DeathCategory, Vec<String>> = entries
            .iter()
            .map(|(category, candidates)| {
                (*category, candidates.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            })
            .collect();
        Self { lines }
    }

    /// Returns the candidates for `category`, falling back to `Default`.
    pub fn candidates(&self, category: DeathCategory) -> &[String] {
        self.lines
            .get(&category)
            .or_else(|| self.lines.get(&DeathCategory::Default))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns whether `category` has its own entry.
    pub fn covers(&self, category: DeathCategory) -> bool {
        self.lines.contains_key(&category)
    }

    /// Composes `<player><random line for category>`.
    pub fn compose<R: Rng + ?Sized>(&self, player: &str, category: DeathCategory, rng: &mut R) -> String {
        let line = self
            .candidates(category)
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(" died.");
        format!("{}{}", player, line)
    }
}

impl Default for FlavorTable {
    fn default() -> Self {
        Self::standard()
    }
}
