use std::collections::HashMap;

/// Renders a message key for end users.
///
/// Rendering never affects control flow; an unknown key should come back
/// as-is so reports stay usable without a catalog.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, domain: Option<&str>, args: &[String]) -> String;
}

/// Substitutes `{0}`, `{1}`... placeholders in `template`.
pub fn substitute(template: &str, args: &[String]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (index, arg)| {
            text.replace(&format!("{{{}}}", index), arg)
        })
}

/// Echoes the key itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyTranslator;

impl Translator for KeyTranslator {
    fn translate(&self, key: &str, _domain: Option<&str>, args: &[String]) -> String {
        substitute(key, args)
    }
}

/// Templates registered per domain, falling back to the domain-less set.
#[derive(Debug, Default, Clone)]
pub struct CatalogTranslator {
    entries: HashMap<(Option<String>, String), String>,
}

impl CatalogTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: Option<&str>, key: &str, template: &str) -> &mut Self {
        self.entries.insert(
            (domain.map(str::to_string), key.to_string()),
            template.to_string(),
        );
        self
    }

    pub fn with(mut self, domain: Option<&str>, key: &str, template: &str) -> Self {
        self.insert(domain, key, template);
        self
    }

    fn lookup(&self, key: &str, domain: Option<&str>) -> Option<&String> {
        self.entries
            .get(&(domain.map(str::to_string), key.to_string()))
            .or_else(|| self.entries.get(&(None, key.to_string())))
    }
}

impl Translator for CatalogTranslator {
    fn translate(&self, key: &str, domain: Option<&str>, args: &[String]) -> String {
        match self.lookup(key, domain) {
            Some(template) => substitute(template, args),
            None => key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_placeholders() {
        let args = vec!["3".to_string(), "10".to_string()];
        assert_eq!(substitute("between {0} and {1}", &args), "between 3 and 10");
        assert_eq!(substitute("no args", &[]), "no args");
    }

    #[test]
    fn test_catalog_domain_fallback() {
        let catalog = CatalogTranslator::new()
            .with(Some("users"), "name_required", "A user needs a name")
            .with(None, "name_required", "Name is required")
            .with(None, "age_range", "Age must be between {0} and {1}");

        assert_eq!(
            catalog.translate("name_required", Some("users"), &[]),
            "A user needs a name"
        );
        assert_eq!(
            catalog.translate("name_required", Some("posts"), &[]),
            "Name is required"
        );
        assert_eq!(
            catalog.translate("age_range", None, &["1".into(), "99".into()]),
            "Age must be between 1 and 99"
        );
        assert_eq!(catalog.translate("unknown", None, &[]), "unknown");
    }
}
