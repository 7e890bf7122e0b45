use std::fmt;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Vintage,
    Grayscale,
}

impl Effect {
    pub fn name(self) -> &'static str {
        match self {
            Effect::Vintage => "vintage",
            Effect::Grayscale => "grayscale",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vintage" => Some(Effect::Vintage),
            "grayscale" => Some(Effect::Grayscale),
            _ => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested effects. Application order is fixed: vintage, then grayscale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectSet {
    vintage: bool,
    grayscale: bool,
}

impl EffectSet {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a comma separated list. Unknown names are dropped.
    pub fn parse(list: &str) -> Self {
        let mut set = Self::none();
        for raw in list.split(',').filter(|s| !s.trim().is_empty()) {
            match Effect::from_name(raw) {
                Some(effect) => set.insert(effect),
                None => debug!("Ignoring unknown effect '{}'", raw.trim()),
            }
        }
        set
    }

    pub fn insert(&mut self, effect: Effect) {
        match effect {
            Effect::Vintage => self.vintage = true,
            Effect::Grayscale => self.grayscale = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.vintage && !self.grayscale
    }

    pub fn chain(&self) -> Vec<Effect> {
        let mut chain = Vec::with_capacity(2);
        if self.vintage {
            chain.push(Effect::Vintage);
        }
        if self.grayscale {
            chain.push(Effect::Grayscale);
        }
        chain
    }
}

impl FromIterator<Effect> for EffectSet {
    fn from_iter<I: IntoIterator<Item = Effect>>(iter: I) -> Self {
        let mut set = Self::none();
        for effect in iter {
            set.insert(effect);
        }
        set
    }
}

impl fmt::Display for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.chain().into_iter().map(Effect::name).collect();
        f.write_str(&names.join(","))
    }
}
