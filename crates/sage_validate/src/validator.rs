//! Document validator.

use crate::rule::DocumentRule;
use sage_core::{Arguments, Error, ErrorLocation, Warning, WarningId};
use sage_query::{Document, Query};
use sage_schema::{ArgumentMap, ArtifactMeta, Entity, Schema, SchemaResult, Type};
use std::collections::HashMap;
use std::sync::Arc;

/// Checks a document against a schema before execution
#[derive(Debug, Clone)]
pub struct DocumentValidator {
    /// Enabled rules
    rules: Vec<DocumentRule>,
}

/// Position of the query being checked
struct Scope<'a> {
    query_name: &'a str,
    path: Vec<String>,
}

impl Scope<'_> {
    fn descend(&self, link: &str) -> Self {
        let mut path = self.path.clone();
        path.push(link.to_string());
        Scope {
            query_name: self.query_name,
            path,
        }
    }

    fn location(&self, field: Option<&str>) -> ErrorLocation {
        let mut parts: Vec<&str> = self.path.iter().map(String::as_str).collect();
        parts.extend(field);
        if parts.is_empty() {
            ErrorLocation::query(self.query_name)
        } else {
            ErrorLocation::field(self.query_name, parts.join("."))
        }
    }
}

impl DocumentValidator {
    /// Create a validator running every rule
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: DocumentRule::ALL.to_vec(),
        }
    }

    /// Run only the given rules
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<DocumentRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Enabled rules
    #[must_use]
    pub fn rules(&self) -> &[DocumentRule] {
        &self.rules
    }

    fn enabled(&self, rule: DocumentRule) -> bool {
        self.rules.contains(&rule)
    }

    /// Validate a document.
    ///
    /// Returns every violation found; an empty list means the document may
    /// be executed.
    ///
    /// # Errors
    ///
    /// Returns error if the schema itself is broken
    pub fn validate(&self, schema: &Schema, document: &Document) -> SchemaResult<Vec<Error>> {
        let mut errors = Vec::new();

        if self.enabled(DocumentRule::UniqueQueryNames) {
            self.validate_unique_names(document, &mut errors);
        }

        for (name, query) in document.queries() {
            let scope = Scope {
                query_name: name,
                path: Vec::new(),
            };
            let Some(entity) = self.root_entity(schema, &scope, query, &mut errors)? else {
                continue;
            };
            self.validate_query(schema, &scope, &entity, entity.arguments(), query, &mut errors)?;
        }

        tracing::debug!(
            queries = document.len(),
            errors = errors.len(),
            "document validated"
        );
        Ok(errors)
    }

    fn report(
        &self,
        errors: &mut Vec<Error>,
        rule: DocumentRule,
        message: String,
        location: ErrorLocation,
    ) {
        if self.enabled(rule) {
            errors.push(
                Error::new(message)
                    .with_locations(vec![location])
                    .with_meta("rule", rule.name()),
            );
        }
    }

    fn validate_unique_names(&self, document: &Document, errors: &mut Vec<Error>) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (name, _) in document.queries() {
            *counts.entry(name.as_str()).or_default() += 1;
        }
        let mut reported: Vec<&str> = Vec::new();
        for (name, _) in document.queries() {
            if counts[name.as_str()] > 1 && !reported.contains(&name.as_str()) {
                reported.push(name);
                self.report(
                    errors,
                    DocumentRule::UniqueQueryNames,
                    format!("There can be only one query named \"{}\"", name),
                    ErrorLocation::query(name.as_str()),
                );
            }
        }
    }

    fn root_entity(
        &self,
        schema: &Schema,
        scope: &Scope<'_>,
        query: &Query,
        errors: &mut Vec<Error>,
    ) -> SchemaResult<Option<Arc<Entity>>> {
        let Some(type_name) = query.type_name() else {
            self.report(
                errors,
                DocumentRule::KnownEntityTypes,
                format!("Query \"{}\" does not name a type", scope.query_name),
                scope.location(None),
            );
            return Ok(None);
        };
        match schema.get_type(type_name)? {
            Some(Type::Entity(entity)) => {
                if entity.is_deprecated() {
                    warn_deprecated(
                        entity.name(),
                        entity.deprecation_reason(),
                    );
                }
                Ok(Some(entity))
            }
            Some(other) => {
                self.report(
                    errors,
                    DocumentRule::KnownEntityTypes,
                    format!("Type \"{}\" is not an entity", other),
                    scope.location(None),
                );
                Ok(None)
            }
            None => {
                self.report(
                    errors,
                    DocumentRule::KnownEntityTypes,
                    format!("Unknown type \"{}\"", type_name),
                    scope.location(None),
                );
                Ok(None)
            }
        }
    }

    fn validate_query(
        &self,
        schema: &Schema,
        scope: &Scope<'_>,
        entity: &Entity,
        declared: &ArgumentMap,
        query: &Query,
        errors: &mut Vec<Error>,
    ) -> SchemaResult<()> {
        for name in query.attributes() {
            match entity.attribute(name) {
                Some(attribute) => note_deprecated(entity, attribute.meta()),
                None => self.report(
                    errors,
                    DocumentRule::KnownArtifacts,
                    format!("Entity \"{}\" has no attribute \"{}\"", entity.name(), name),
                    scope.location(Some(name)),
                ),
            }
        }

        let act = match query.act() {
            Some(name) => match entity.act(name) {
                Some(act) => {
                    note_deprecated(entity, act.meta());
                    Some(act)
                }
                None => {
                    self.report(
                        errors,
                        DocumentRule::KnownArtifacts,
                        format!("Entity \"{}\" has no act \"{}\"", entity.name(), name),
                        scope.location(Some(name)),
                    );
                    None
                }
            },
            None => None,
        };

        self.validate_arguments(
            schema,
            scope,
            declared,
            act.map(|a| a.arguments()),
            query.arguments(),
            errors,
        )?;

        for (name, nested) in query.links() {
            let Some(link) = entity.link(name) else {
                self.report(
                    errors,
                    DocumentRule::KnownArtifacts,
                    format!("Entity \"{}\" has no link \"{}\"", entity.name(), name),
                    scope.location(Some(name)),
                );
                continue;
            };
            note_deprecated(entity, link.meta());

            let target = link.links_to(entity.name(), schema)?;
            let Some(target) = target.as_entity() else {
                continue;
            };
            let nested_scope = scope.descend(name);
            if let Some(type_name) = nested.type_name() {
                if type_name != target.name() {
                    self.report(
                        errors,
                        DocumentRule::KnownEntityTypes,
                        format!(
                            "Link \"{}\" returns \"{}\" but the nested query names type \"{}\"",
                            name,
                            target.name(),
                            type_name
                        ),
                        nested_scope.location(None),
                    );
                }
            }
            self.validate_query(schema, &nested_scope, target, link.arguments(), nested, errors)?;
        }
        Ok(())
    }

    fn validate_arguments(
        &self,
        schema: &Schema,
        scope: &Scope<'_>,
        declared: &ArgumentMap,
        act: Option<&ArgumentMap>,
        supplied: &Arguments,
        errors: &mut Vec<Error>,
    ) -> SchemaResult<()> {
        for (name, value) in supplied {
            let Some(argument) = declared.get(name).or_else(|| act.and_then(|a| a.get(name))) else {
                self.report(
                    errors,
                    DocumentRule::KnownArgumentNames,
                    format!("Unknown argument \"{}\"", name),
                    scope.location(None),
                );
                continue;
            };
            if !self.enabled(DocumentRule::ArgumentsOfCorrectType) {
                continue;
            }
            let input_type = argument.type_ref().resolve(schema)?;
            if let Err(err) = input_type.parse_value(value, schema)? {
                self.report(
                    errors,
                    DocumentRule::ArgumentsOfCorrectType,
                    format!(
                        "Argument \"{}\" has invalid value {}: {}",
                        name,
                        value,
                        err.message()
                    ),
                    scope.location(None),
                );
            }
        }

        if self.enabled(DocumentRule::ProvidedRequiredArguments) {
            for argument in declared.values().chain(act.into_iter().flat_map(|a| a.values())) {
                if !supplied.contains_key(argument.name()) && argument.is_required(schema)? {
                    self.report(
                        errors,
                        DocumentRule::ProvidedRequiredArguments,
                        format!(
                            "Argument \"{}\" of type \"{}\" is required but not provided",
                            argument.name(),
                            argument.type_ref()
                        ),
                        scope.location(None),
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for DocumentValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn note_deprecated(entity: &Entity, meta: &ArtifactMeta) {
    if meta.deprecated {
        warn_deprecated(
            &format!("{}.{}", entity.name(), meta.name),
            meta.deprecation_reason.as_deref(),
        );
    }
}

fn warn_deprecated(what: &str, reason: Option<&str>) {
    let message = match reason {
        Some(reason) => format!("{} is deprecated: {}", what, reason),
        None => format!("{} is deprecated", what),
    };
    Warning::warn(&message, WarningId::DEPRECATED_USAGE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_promise::Thenable;
    use sage_schema::{Act, Argument, Attribute, Link};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema() -> Schema {
        let org = Type::entity(
            Entity::builder("Org")
                .resolve(|_, _| Ok(Thenable::value(json!({}))))
                .attribute(Attribute::property("title").with_type(Type::string()))
                .build()
                .unwrap(),
        );
        let user = Type::entity(
            Entity::builder("User")
                .resolve(|_, _| Ok(Thenable::value(json!({}))))
                .argument(Argument::new("id", Type::non_null(Type::id()).unwrap()))
                .argument(Argument::new("limit", Type::int()).with_default(10))
                .attribute(Attribute::property("name").with_type(Type::string()))
                .attribute(Attribute::property("nick").deprecated("use name"))
                .act(
                    Act::new("rename", |_, args| Ok(Thenable::value(args["to"].clone())))
                        .with_argument(Argument::new("to", Type::non_null(Type::string()).unwrap())),
                )
                .link(
                    Link::new("org", org.clone(), |r, _| Ok(Thenable::value(r.clone())))
                        .with_argument(Argument::new("active", Type::boolean())),
                )
                .build()
                .unwrap(),
        );
        Schema::builder().types([user, org]).build().unwrap()
    }

    fn user(id: i64) -> sage_query::QueryBuilder {
        Query::builder("User").argument("id", id)
    }

    fn rules_of(errors: &[Error]) -> Vec<String> {
        errors
            .iter()
            .map(|e| e.meta()["rule"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_valid_document() {
        let document = Document::new()
            .with_query("u", user(1).attribute("name").link("org", Query::nested().attribute("title").build()).build())
            .with_query("r", user(2).act("rename").argument("to", "Ada").build());
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_duplicate_query_names() {
        let document = Document::new()
            .with_query("u", user(1).attribute("name").build())
            .with_query("u", user(2).attribute("name").build());
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        assert_eq!(rules_of(&errors), ["UniqueQueryNames"]);
        assert_eq!(errors[0].locations()[0].query, "u");
    }

    #[test]
    fn test_unknown_and_non_entity_types() {
        let document = Document::new()
            .with_query("a", Query::builder("Ghost").build())
            .with_query("b", Query::builder("Int").build())
            .with_query("c", Query::nested().build());
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        assert_eq!(rules_of(&errors), ["KnownEntityTypes"; 3]);
        assert_eq!(errors[0].message(), "Unknown type \"Ghost\"");
        assert_eq!(errors[1].message(), "Type \"Int\" is not an entity");
    }

    #[test]
    fn test_unknown_artifacts_are_located() {
        let document = Document::new().with_query(
            "u",
            user(1)
                .attribute("age")
                .act("delete")
                .link("org", Query::nested().attribute("budget").build())
                .link("friends", Query::nested().build())
                .build(),
        );
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        let fields: Vec<_> = errors
            .iter()
            .map(|e| e.locations()[0].field.clone().unwrap_or_default())
            .collect();
        assert_eq!(fields, ["age", "delete", "org.budget", "friends"]);
        assert!(rules_of(&errors).iter().all(|r| r == "KnownArtifacts"));
    }

    #[test]
    fn test_nested_type_must_match_link_target() {
        let document = Document::new().with_query(
            "u",
            user(1)
                .link("org", Query::builder("User").attribute("title").build())
                .build(),
        );
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        assert_eq!(rules_of(&errors), ["KnownEntityTypes"]);
        assert_eq!(errors[0].locations()[0].field.as_deref(), Some("org"));
    }

    #[test]
    fn test_argument_rules() {
        let document = Document::new()
            .with_query("missing", Query::builder("User").attribute("name").build())
            .with_query("unknown", user(1).argument("color", "red").build())
            .with_query("wrong", Query::builder("User").argument("id", true).build())
            .with_query("act", user(1).act("rename").build())
            .with_query(
                "nested",
                user(1)
                    .link("org", Query::nested().argument("active", "yes").build())
                    .build(),
            );
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        assert_eq!(
            rules_of(&errors),
            [
                "ProvidedRequiredArguments",
                "KnownArgumentNames",
                "ArgumentsOfCorrectType",
                "ProvidedRequiredArguments",
                "ArgumentsOfCorrectType",
            ]
        );
        assert_eq!(errors[4].locations()[0].field.as_deref(), Some("org"));
        assert!(errors.iter().all(|e| sage_core::ClientAware::is_client_safe(e)));
    }

    #[test]
    fn test_with_rules_restricts() {
        let document = Document::new()
            .with_query("u", Query::builder("User").attribute("age").build())
            .with_query("u", Query::builder("Ghost").build());
        let validator = DocumentValidator::new().with_rules(vec![DocumentRule::KnownArtifacts]);
        let errors = validator.validate(&schema(), &document).unwrap();
        assert_eq!(rules_of(&errors), ["KnownArtifacts"]);
        assert_eq!(validator.rules(), [DocumentRule::KnownArtifacts]);
    }

    #[test]
    fn test_deprecated_usage_warns() {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        Warning::set_warning_handler(Some(Arc::new(move |message: &str, id: WarningId| {
            if id == WarningId::DEPRECATED_USAGE && message.contains("User.nick") {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        })));
        let document = Document::new().with_query("u", user(1).attribute("nick").build());
        let errors = DocumentValidator::new().validate(&schema(), &document).unwrap();
        Warning::set_warning_handler(None);
        assert!(errors.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
