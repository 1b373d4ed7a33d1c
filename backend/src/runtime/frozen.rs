use std::{borrow::Cow, collections::BTreeMap};

/// Serialized modules available to `import`, keyed by module name.
///
/// Images are usually the `M_<name>` arrays linked into a binary, so
/// borrowed `'static` slices are stored without copying.
#[derive(Debug, Default, Clone)]
pub struct FrozenTable {
    modules: BTreeMap<String, Cow<'static, [u8]>>,
}

impl FrozenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, image: impl Into<Cow<'static, [u8]>>) {
        self.modules.insert(name.into(), image.into());
    }

    pub fn with(mut self, name: impl Into<String>, image: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(name, image);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.modules.get(name).map(|image| image.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static IMAGE: [u8; 3] = [1, 2, 3];

    #[test]
    fn stores_static_and_owned_images() {
        let table = FrozenTable::new()
            .with("b", &IMAGE[..])
            .with("a", vec![9u8]);
        assert_eq!(table.get("b"), Some(&IMAGE[..]));
        assert_eq!(table.get("a"), Some(&[9u8][..]));
        assert_eq!(table.get("c"), None);

        let replaced = table.with("b", vec![7u8]);
        assert_eq!(replaced.get("b"), Some(&[7u8][..]));
    }
}
