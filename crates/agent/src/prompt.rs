use querent_core::domain::tenant::TenantId;
use tera::{Context, Tera};

use crate::error::AgentError;

const SYSTEM_TEMPLATE: &str = "system.txt";
const QUESTION_TEMPLATE: &str = "question.txt";

const SYSTEM_PROMPT: &str = r#"You answer questions about business records stored in the '{{ collection }}' collection by writing MongoDB aggregation pipelines and running them with the tools provided.

Data layout:
- Every record belongs to a company and carries its custom fields under `templates_fields_data`.
- Field paths have the form `templates_fields_data.<template-id>#<field-key>`; table columns add `.<column-key>`.
- The `mongodb_schema` tool lists every path with its data type, grouped by entity (table). Related entities reference each other.
- Only records with "status": "ACTIVE" exist; everything else is deleted.

Rules for every query:
- Query only '{{ collection }}'. Never ask the user for a collection name or a company id.
- Start with a `$match` stage on "status": "ACTIVE" and on the company, which must be ObjectId("{{ tenant_id }}").
- Match text case-insensitively.
- Check a field's data type in the schema before using it. Convert numeric fields to a numeric type before comparing or aggregating them.
- Fields of type ENTITY hold the id of another record; filter and display them through the same path with the `/name` suffix.
- Require the field to exist and do not count null values.
- If the field the user means exists in more than one entity, ask the user which one they mean.
- Project only the fields needed for the answer.
- Never insert, update or delete data.

Dates:
- Stored dates are the UTC instant of local midnight in the user's timezone, for example `"2024-01-04T18:30:00.000Z"`.
- The user's timezone is {{ timezone }}.
- For relative dates (today, yesterday, this month, last year) call `get_current_date_time` and use its UTC boundaries.
- For specific dates call `convert_date_to_utc` with the date and '{{ timezone }}', and use `utc_start_of_day`.
- Express ranges with `$gte` and `$lt`. If a date filter returns nothing, retry comparing the dates as strings.

Working order:
1. Call `mongodb_list_collections`, then `mongodb_schema`.
2. Map the user's words onto schema paths; the user may not use the exact field names.
3. Resolve any dates with the date tools.
4. Check the pipeline with `mongodb_query_checker`, then run it with `mongodb_query`.
5. If a query fails, read the error, fix the pipeline and try again.
6. As soon as the results answer the question, stop and reply concisely using only those results.
Avoid calling a tool again for information you already have.

Example:
{% raw %}db.entities_data.aggregate([{"$match": {"company": ObjectId("<company id>"), "status": "ACTIVE", "templates_fields_data.62b4145c3fd6fa779848acb6#name": {"$exists": true, "$regex": "^anusha$", "$options": "i"}}}]){% endraw %}
"#;

const QUESTION_PROMPT: &str = r#"**USER_QUESTION**: {{ question }}
**RULES**: Answer greetings and small talk directly. For anything about the data, filter on company ObjectId("{{ tenant_id }}") and fetch the schema with the tools before writing a query."#;

/// Renders the system instructions and the wrapped user question.
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, AgentError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![(SYSTEM_TEMPLATE, SYSTEM_PROMPT), (QUESTION_TEMPLATE, QUESTION_PROMPT)])
            .map_err(|error| AgentError::Prompt(error.to_string()))?;
        Ok(Self { tera })
    }

    pub fn system_instruction(
        &self,
        tenant_id: &TenantId,
        timezone: &str,
        collection: &str,
    ) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("tenant_id", &tenant_id.0);
        context.insert("timezone", timezone);
        context.insert("collection", collection);
        self.render(SYSTEM_TEMPLATE, &context)
    }

    pub fn user_question(&self, tenant_id: &TenantId, question: &str) -> Result<String, AgentError> {
        let mut context = Context::new();
        context.insert("tenant_id", &tenant_id.0);
        context.insert("question", question.trim());
        self.render(QUESTION_TEMPLATE, &context)
    }

    fn render(&self, template: &str, context: &Context) -> Result<String, AgentError> {
        self.tera.render(template, context).map_err(|error| AgentError::Prompt(error.to_string()))
    }
}
