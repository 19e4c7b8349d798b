//! Flattening of tenant templates into a stable field-path vocabulary.
//!
//! Every emitted path has the shape
//! `templates_fields_data.<template-id>#<field-key>[.<column-key>][/name]: <type>`.
//! Paths are produced in document order, so identical input always yields an
//! identical vocabulary.

use std::collections::{BTreeSet, HashMap};

use crate::domain::template::{Entity, InputType, Template, TemplateId};
use crate::schema::vocabulary::Vocabulary;

pub const FIELDS_DATA_CONTAINER: &str = "templates_fields_data";

const ENTITY_NAME_SUFFIX: &str = "/name";

/// Entity → template-id references of the active entities of one tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityTemplateIndex {
    entries: Vec<(String, Vec<TemplateId>)>,
    referenced: BTreeSet<TemplateId>,
}

impl EntityTemplateIndex {
    /// Entities that are not active, or that reference no template, are left out.
    pub fn build(entities: &[Entity]) -> Self {
        let mut index = Self::default();
        for entity in entities.iter().filter(|entity| entity.status.is_active()) {
            let template_ids = entity.template_ids();
            if template_ids.is_empty() {
                continue;
            }
            index.referenced.extend(template_ids.iter().cloned());
            index.entries.push((entity.name.clone(), template_ids));
        }
        index
    }

    pub fn referenced_template_ids(&self) -> Vec<TemplateId> {
        self.referenced.iter().cloned().collect()
    }

    pub fn entries(&self) -> &[(String, Vec<TemplateId>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn flattened_path(
    template_id: &TemplateId,
    field_key: &str,
    column_key: Option<&str>,
    input_type: &InputType,
) -> String {
    let column = column_key.map(|key| format!(".{key}")).unwrap_or_default();
    let suffix = if input_type.is_entity_reference() { ENTITY_NAME_SUFFIX } else { "" };
    format!("{FIELDS_DATA_CONTAINER}.{template_id}#{field_key}{column}{suffix}: {input_type}")
}

/// Ordered paths contributed by one template.
///
/// `ENTITY_TABLE` fields are skipped together with their columns; an
/// `ENTITY_TABLE` column is skipped on its own. Fields without a key emit
/// nothing, because their columns would have no parent to hang off.
pub fn template_paths(template: &Template) -> Vec<String> {
    let mut paths = Vec::new();
    for section in &template.sections {
        for field in &section.fields {
            let field_type = field.input_type.clone().unwrap_or_default();
            if field_type.is_entity_table() {
                continue;
            }
            let Some(field_key) = field.key.as_deref() else {
                continue;
            };
            paths.push(flattened_path(&template.id, field_key, None, &field_type));

            for column in &field.data_table_columns {
                let column_type = column.input_type.clone().unwrap_or_default();
                if column_type.is_entity_table() {
                    continue;
                }
                if let Some(column_key) = column.key.as_deref() {
                    paths.push(flattened_path(
                        &template.id,
                        field_key,
                        Some(column_key),
                        &column_type,
                    ));
                }
            }
        }
    }
    paths
}

/// Builds the tenant vocabulary from its entities and the templates they reference.
///
/// A referenced template that is missing or inactive contributes no paths.
/// Entities sharing a name collapse to the last one seen.
pub fn flatten(entities: &[Entity], templates: &[Template]) -> Vocabulary {
    let index = EntityTemplateIndex::build(entities);

    let template_paths: HashMap<&TemplateId, Vec<String>> = templates
        .iter()
        .filter(|template| template.status.is_active())
        .map(|template| (&template.id, template_paths(template)))
        .collect();

    let mut vocabulary = Vocabulary::new();
    for (entity_name, template_ids) in index.entries() {
        let paths = template_ids
            .iter()
            .filter_map(|template_id| template_paths.get(template_id))
            .flat_map(|paths| paths.iter().cloned())
            .collect();
        vocabulary.insert(entity_name.clone(), paths);
    }
    vocabulary
}

#[cfg(test)]
mod tests {
    use crate::domain::template::{
        Column, Entity, Field, InputType, LifecycleStatus, Section, Template, TemplateId,
        TemplateRef,
    };

    use super::{flatten, EntityTemplateIndex};

    fn entity(name: &str, template_ids: &[&str]) -> Entity {
        Entity {
            name: name.to_string(),
            status: LifecycleStatus::Active,
            templates: template_ids
                .iter()
                .map(|id| TemplateRef { template_id: Some(TemplateId(id.to_string())) })
                .collect(),
        }
    }

    fn field(key: &str, input_type: Option<&str>) -> Field {
        Field {
            key: Some(key.to_string()),
            input_type: input_type.map(InputType::from),
            data_table_columns: Vec::new(),
        }
    }

    fn column(key: &str, input_type: Option<&str>) -> Column {
        Column { key: Some(key.to_string()), input_type: input_type.map(InputType::from) }
    }

    fn template(id: &str, fields: Vec<Field>) -> Template {
        Template {
            id: TemplateId(id.to_string()),
            status: LifecycleStatus::Active,
            sections: vec![Section { fields }],
        }
    }

    #[test]
    fn single_scalar_field_produces_single_path() {
        let vocabulary = flatten(
            &[entity("Customer", &["T1"])],
            &[template("T1", vec![field("email", Some("string"))])],
        );

        assert_eq!(
            vocabulary.paths("Customer"),
            Some(&["templates_fields_data.T1#email: string".to_string()][..])
        );
    }

    #[test]
    fn entity_reference_gets_name_suffix() {
        let vocabulary = flatten(
            &[entity("Deal", &["T1"])],
            &[template("T1", vec![field("owner", Some("ENTITY")), field("stage", Some("DROPDOWN"))])],
        );

        let paths = vocabulary.paths("Deal").expect("deal paths");
        assert_eq!(paths[0], "templates_fields_data.T1#owner/name: ENTITY");
        assert_eq!(paths[1], "templates_fields_data.T1#stage: DROPDOWN");
    }

    #[test]
    fn missing_type_defaults_to_string() {
        let vocabulary =
            flatten(&[entity("Note", &["T1"])], &[template("T1", vec![field("body", None)])]);

        assert_eq!(
            vocabulary.paths("Note").expect("paths")[0],
            "templates_fields_data.T1#body: string"
        );
    }

    #[test]
    fn table_columns_are_nested_under_their_field() {
        let mut items = field("items", Some("DATA_TABLE"));
        items.data_table_columns = vec![
            column("sku", None),
            column("product", Some("ENTITY")),
            column("parts", Some("ENTITY_TABLE")),
        ];
        let vocabulary = flatten(&[entity("Order", &["T9"])], &[template("T9", vec![items])]);

        assert_eq!(
            vocabulary.paths("Order").expect("paths"),
            &[
                "templates_fields_data.T9#items: DATA_TABLE".to_string(),
                "templates_fields_data.T9#items.sku: string".to_string(),
                "templates_fields_data.T9#items.product/name: ENTITY".to_string(),
            ][..]
        );
    }

    #[test]
    fn entity_table_fields_never_appear() {
        let mut lines = field("lines", Some("ENTITY_TABLE"));
        lines.data_table_columns = vec![column("qty", Some("NUMBER"))];
        let vocabulary = flatten(
            &[entity("Invoice", &["T1"])],
            &[template("T1", vec![lines, field("number", Some("NUMBER"))])],
        );

        let paths = vocabulary.paths("Invoice").expect("paths");
        assert_eq!(paths, &["templates_fields_data.T1#number: NUMBER".to_string()][..]);
        assert!(paths.iter().all(|path| !path.contains("ENTITY_TABLE")));
    }

    #[test]
    fn templates_concatenate_in_entity_order_and_unknown_templates_are_ignored() {
        let vocabulary = flatten(
            &[entity("Customer", &["T2", "MISSING", "T1"])],
            &[
                template("T1", vec![field("email", Some("string"))]),
                template("T2", vec![field("name", Some("string"))]),
            ],
        );

        assert_eq!(
            vocabulary.paths("Customer").expect("paths"),
            &[
                "templates_fields_data.T2#name: string".to_string(),
                "templates_fields_data.T1#email: string".to_string(),
            ][..]
        );
    }

    #[test]
    fn inactive_templates_and_entities_contribute_nothing() {
        let mut retired = template("T1", vec![field("email", Some("string"))]);
        retired.status = LifecycleStatus::Inactive;
        let mut archived = entity("Archived", &["T2"]);
        archived.status = LifecycleStatus::Other("DELETED".to_string());

        let vocabulary = flatten(
            &[entity("Customer", &["T1"]), archived],
            &[retired, template("T2", vec![field("x", None)])],
        );

        assert_eq!(vocabulary.paths("Customer"), Some(&[][..]));
        assert!(vocabulary.paths("Archived").is_none());
    }

    #[test]
    fn entities_without_template_refs_are_omitted() {
        let index = EntityTemplateIndex::build(&[
            entity("Empty", &[]),
            entity("Customer", &["T2", "T1"]),
            entity("Orders", &["T1"]),
        ]);

        assert_eq!(index.entries().len(), 2);
        assert_eq!(
            index.referenced_template_ids(),
            vec![TemplateId("T1".to_string()), TemplateId("T2".to_string())]
        );
    }

    #[test]
    fn flattening_is_deterministic() {
        let entities = vec![entity("B", &["T1", "T2"]), entity("A", &["T2"])];
        let templates = vec![
            template("T1", vec![field("one", Some("NUMBER")), field("ref", Some("ENTITY"))]),
            template("T2", vec![field("two", None)]),
        ];

        let first = flatten(&entities, &templates).to_pretty_json();
        for _ in 0..5 {
            assert_eq!(flatten(&entities, &templates).to_pretty_json(), first);
        }
    }
}
