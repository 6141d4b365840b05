use std::collections::HashMap;

use crate::domain::ChatId;

/// Source chat -> ordered target chats.
pub type MirrorMapping = HashMap<ChatId, Vec<ChatId>>;

/// Static, read-only view over the configured mirror mapping.
#[derive(Clone, Debug, Default)]
pub struct MirrorRouter {
    mapping: MirrorMapping,
}

impl MirrorRouter {
    /// Builds the router. Duplicate targets for one source collapse to their
    /// first occurrence; sources without targets are dropped.
    pub fn new(mapping: MirrorMapping) -> Self {
        let mapping = mapping
            .into_iter()
            .filter_map(|(source, targets)| {
                let mut ordered: Vec<ChatId> = Vec::with_capacity(targets.len());
                for t in targets {
                    if !ordered.contains(&t) {
                        ordered.push(t);
                    }
                }
                (!ordered.is_empty()).then_some((source, ordered))
            })
            .collect();
        Self { mapping }
    }

    /// Targets for `source`, in configured order. Empty when not mirrored.
    pub fn targets(&self, source: ChatId) -> &[ChatId] {
        self.mapping.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_source(&self, chat_id: ChatId) -> bool {
        self.mapping.contains_key(&chat_id)
    }

    /// Configured source chats, sorted for stable logging.
    pub fn source_chats(&self) -> Vec<ChatId> {
        let mut out: Vec<ChatId> = self.mapping.keys().copied().collect();
        out.sort();
        out
    }
}
