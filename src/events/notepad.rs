//! Note-taking application actions

use super::Action;
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Map;

/// Stateless action emitter for the notepad application
///
/// Notepad sessions have no funnel; each action is drawn independently
/// from a small pool of navigation and content-edit events.
#[derive(Debug, Default)]
pub struct NotepadActions {
    notes_created: u32,
}

impl NotepadActions {
    /// New emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-session state
    pub fn begin_session(&mut self) {
        self.notes_created = 0;
    }

    /// Emit the next notepad action
    pub fn next_action(&mut self, rng: &mut StdRng) -> Action {
        match rng.gen_range(0..8) {
            0 | 1 => {
                let screen = ["main", "note_list", "settings"][rng.gen_range(0..3)];
                let mut attributes = Map::new();
                attributes.insert("screen_name".into(), screen.into());
                Action {
                    name: "screen_view",
                    attributes,
                }
            }
            2 => {
                self.notes_created += 1;
                let mut attributes = Map::new();
                attributes.insert("note_id".into(), rng.gen::<u32>().into());
                Action {
                    name: "note_create",
                    attributes,
                }
            }
            3 | 4 | 5 => {
                let mut attributes = Map::new();
                attributes.insert("note_id".into(), rng.gen::<u32>().into());
                attributes.insert("edit_length".into(), rng.gen_range(1..200u32).into());
                Action {
                    name: "note_edit",
                    attributes,
                }
            }
            6 => {
                let mut attributes = Map::new();
                attributes.insert("note_id".into(), rng.gen::<u32>().into());
                attributes.insert(
                    "channel".into(),
                    ["email", "link", "clipboard"][rng.gen_range(0..3)].into(),
                );
                Action {
                    name: "note_share",
                    attributes,
                }
            }
            _ => {
                let mut attributes = Map::new();
                attributes.insert("format".into(), ["pdf", "txt"][rng.gen_range(0..2)].into());
                Action {
                    name: "note_export",
                    attributes,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_notepad_action_names() {
        let known = [
            "screen_view",
            "note_create",
            "note_edit",
            "note_share",
            "note_export",
        ];
        let mut emitter = NotepadActions::new();
        let mut rng = StdRng::seed_from_u64(11);

        emitter.begin_session();
        for _ in 0..200 {
            let action = emitter.next_action(&mut rng);
            assert!(known.contains(&action.name), "unknown {}", action.name);
        }
    }
}
