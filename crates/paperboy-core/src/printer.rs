/// A printer as reported by the spooler's live printer table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Printer {
    pub name: String,
    pub location: String,
}

impl Printer {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }

    /// Display label: `"<alias> <name>, <location>"`.
    ///
    /// The alias is an optional prefix; `", <location>"` is left out when the
    /// location is blank.
    pub fn get_id(&self, aliases: &PrinterAliases) -> String {
        let label = match aliases.get(&self.name) {
            Some(alias) => format!("{alias} {}", self.name),
            None => self.name.clone(),
        };
        if self.location.trim().is_empty() {
            return label;
        }
        format!("{label}, {}", self.location)
    }
}

/// Friendly labels for well-known printer names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrinterAliases {
    entries: Vec<(String, String)>,
}

impl PrinterAliases {
    /// Parse `Name=Label,Name=Label`. Malformed pairs are skipped.
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, label)| (name.trim().to_string(), label.trim().to_string()))
            .filter(|(name, label)| !name.is_empty() && !label.is_empty())
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, label)| label.as_str())
    }
}
