//! What the public call screen shows.

use crate::realtime::ConnectionState;
use clinic_core::CallEvent;
use std::collections::VecDeque;

pub const DEFAULT_HISTORY_SIZE: usize = 5;

const RULE_WIDTH: usize = 48;

/// Current call plus a bounded, most-recent-first history.
#[derive(Clone, Debug)]
pub struct CallBoard {
    current: Option<CallEvent>,
    history: VecDeque<CallEvent>,
    limit: usize,
}

impl Default for CallBoard {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl CallBoard {
    pub fn new(limit: usize) -> Self {
        Self {
            current: None,
            history: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    /// The event becomes current and is prepended to the history.
    pub fn record(&mut self, event: CallEvent) {
        self.history.push_front(event.clone());
        self.history.truncate(self.limit);
        self.current = Some(event);
    }

    pub fn current(&self) -> Option<&CallEvent> {
        self.current.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &CallEvent> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn render(&self, state: ConnectionState) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = format!("{:>width$}\n{rule}\n", format!("● {}", state.label()), width = RULE_WIDTH);

        match &self.current {
            Some(call) => {
                out.push_str(&format!("\n  {}\n", call.patient.full_name));
                if let Some(office) = call.office_number {
                    out.push_str(&format!("  Consultório {office}\n"));
                }
            }
            None => out.push_str("\n  Aguardando chamadas...\n"),
        }

        if !self.history.is_empty() {
            out.push_str(&format!("\n{}\nÚltimas Chamadas\n", "-".repeat(RULE_WIDTH)));
            for call in &self.history {
                match call.office_number {
                    Some(office) => out.push_str(&format!(
                        "  {} - Consultório {}\n",
                        call.patient.full_name, office
                    )),
                    None => out.push_str(&format!("  {}\n", call.patient.full_name)),
                }
            }
        }
        out
    }
}
