/// A decoded prefix list. `supported == false` means the owner opted out of
/// routing; such a list never carries entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixList {
    pub supported: bool,
    pub entries: Vec<String>,
}

impl PrefixList {
    pub fn supported(entries: Vec<String>) -> Self {
        Self {
            supported: true,
            entries,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
