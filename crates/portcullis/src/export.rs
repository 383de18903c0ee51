//! Attribute export as environment variables.

use portcullis_authz::AliasTable;
use portcullis_config::AttributesSection;
use portcullis_session::SessionRecord;

/// Attribute name under which the subject's name-id is recorded.
pub const NAME_ID_ATTRIBUTE: &str = "NAME_ID";

/// How attributes are turned into variables.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Prefix added to every variable whose alias does not opt out.
    pub prefix: String,

    /// Join all values into `NAME` with this separator instead of using the
    /// first value.
    pub merge_separator: Option<String>,

    /// Index of the first `NAME_i` variable.
    pub index_start: usize,

    /// Emit `NAME_N` with the value count.
    pub count_in_n: bool,

    /// Alternative variable names for stored attributes.
    pub aliases: AliasTable,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            prefix: "SAML_".to_string(),
            merge_separator: None,
            index_start: 0,
            count_in_n: false,
            aliases: AliasTable::new(),
        }
    }
}

impl ExportSettings {
    /// Settings from the `[attributes]` section.
    pub fn from_section(section: &AttributesSection, aliases: AliasTable) -> Self {
        Self {
            prefix: section.env_prefix.clone(),
            merge_separator: section.merge_separator.clone(),
            index_start: section.index_start,
            count_in_n: section.count_in_n,
            aliases,
        }
    }

    fn variable_name(&self, stored: &str) -> String {
        match self.aliases.get(stored) {
            Some(alias) if !alias.prefixed => alias.name.clone(),
            Some(alias) => format!("{}{}", self.prefix, alias.name),
            None => format!("{}{}", self.prefix, stored),
        }
    }
}

/// Variables describing `record`'s attributes, in attribute-name order.
///
/// Session ids and cookie tokens never appear in the output.
pub fn export_env(record: &SessionRecord, settings: &ExportSettings) -> Vec<(String, String)> {
    let mut vars = Vec::new();

    for (name, values) in &record.attributes {
        let var = settings.variable_name(name);

        if let Some(first) = values.first() {
            let value = match &settings.merge_separator {
                Some(sep) => values.join(sep),
                None => first.clone(),
            };
            vars.push((var.clone(), value));
        }
        for (i, value) in values.iter().enumerate() {
            vars.push((format!("{var}_{}", i + settings.index_start), value.clone()));
        }
        if settings.count_in_n {
            vars.push((format!("{var}_N"), values.len().to_string()));
        }
    }

    if !record.attributes.contains_key(NAME_ID_ATTRIBUTE)
        && let Some(name_id) = &record.name_id
    {
        vars.push((
            format!("{}{NAME_ID_ATTRIBUTE}", settings.prefix),
            name_id.value.clone(),
        ));
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portcullis_authz::Alias;
    use portcullis_session::NameId;

    fn record() -> SessionRecord {
        let mut record = SessionRecord::with_ttl(Utc::now(), 600);
        record.set_values("mail", vec!["a@example.com".into(), "b@example.com".into()]);
        record.set_values("empty", Vec::new());
        record.name_id = Some(NameId::new("alice"));
        record
    }

    fn lookup<'a>(vars: &'a [(String, String)], name: &str) -> Option<&'a str> {
        vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_export() {
        let vars = export_env(&record(), &ExportSettings::default());
        assert_eq!(lookup(&vars, "SAML_mail"), Some("a@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail_0"), Some("a@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail_1"), Some("b@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail_N"), None);
        assert_eq!(lookup(&vars, "SAML_empty"), None);
        assert_eq!(lookup(&vars, "SAML_NAME_ID"), Some("alice"));
    }

    #[test]
    fn test_merge_count_and_index() {
        let settings = ExportSettings {
            merge_separator: Some(";".into()),
            index_start: 1,
            count_in_n: true,
            ..ExportSettings::default()
        };
        let vars = export_env(&record(), &settings);
        assert_eq!(lookup(&vars, "SAML_mail"), Some("a@example.com;b@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail_1"), Some("a@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail_2"), Some("b@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail_N"), Some("2"));
        assert_eq!(lookup(&vars, "SAML_empty_N"), Some("0"));
    }

    #[test]
    fn test_aliases() {
        let mut aliases = AliasTable::new().with_alias("mail", "EMAIL");
        aliases.insert(
            "empty",
            Alias {
                name: "RAW".into(),
                prefixed: false,
            },
        );
        let settings = ExportSettings {
            aliases,
            count_in_n: true,
            ..ExportSettings::default()
        };
        let vars = export_env(&record(), &settings);
        assert_eq!(lookup(&vars, "SAML_EMAIL"), Some("a@example.com"));
        assert_eq!(lookup(&vars, "SAML_mail"), None);
        assert_eq!(lookup(&vars, "RAW_N"), Some("0"));
    }

    #[test]
    fn test_secrets_never_exported() {
        let record = record();
        let vars = export_env(&record, &ExportSettings::default());
        assert!(vars.iter().all(|(_, v)| {
            v != record.session_id.as_str() && v != &record.cookie_token
        }));
    }
}
