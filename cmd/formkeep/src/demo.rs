//! Scripted walkthrough used by `formkeep demo`.

use anyhow::{Context, Result};
use domains::{
    FieldAnswer, FieldAttributes, FieldDefinition, FieldId, FieldType, ProposedField,
    ScheduleWindow, SubmissionPolicy, Submitter, UserId,
};
use services::ResponseContent;
use tracing::info;

use crate::{print_json, App};

fn field_id(fields: &[FieldDefinition], label: &str) -> Result<FieldId> {
    fields
        .iter()
        .find(|field| field.attrs.label == label)
        .map(|field| field.id)
        .with_context(|| format!("field {label:?} missing after save"))
}

pub(crate) async fn run(app: &App) -> Result<()> {
    let owner = UserId::new();
    let policy = SubmissionPolicy {
        allow_anonymous: true,
        allow_multiple_submissions: true,
        allow_editing: true,
    };
    let form = app
        .forms
        .create_form(
            owner,
            "Customer feedback",
            Some("Quarterly satisfaction survey"),
            policy,
            ScheduleWindow::default(),
        )
        .await?;

    let mut name = FieldAttributes::new("Name", FieldType::Text);
    name.required = true;
    let mut email = FieldAttributes::new("Email", FieldType::Email);
    email.order = 1;
    let mut score = FieldAttributes::new("Score", FieldType::Number);
    score.order = 2;
    score.min_value = Some(1.0);
    score.max_value = Some(10.0);

    let saved = app
        .editor
        .save_with_retry(
            owner,
            form.id,
            vec![
                ProposedField::new(name),
                ProposedField::new(email),
                ProposedField::new(score),
            ],
            None,
            app.retry_attempts,
        )
        .await?;
    let name_id = field_id(&saved.fields, "Name")?;
    let email_id = field_id(&saved.fields, "Email")?;
    let score_id = field_id(&saved.fields, "Score")?;
    app.forms.publish(form.id, owner).await?;

    let first = app
        .responses
        .submit(
            form.id,
            Submitter::Anonymous { email: None },
            ResponseContent {
                answers: vec![
                    FieldAnswer::single(name_id, "Ana"),
                    FieldAnswer::single(email_id, "ana@example.com"),
                    FieldAnswer::single(score_id, "8"),
                ],
                rating: Some(4),
                comments: Some("Quick and painless".into()),
            },
        )
        .await?;
    info!(response_id = %first.id, version = first.form_version, "first response stored");

    // Renaming and widening text to textarea keeps version 1.
    let mut fields: Vec<ProposedField> = saved.fields.iter().map(ProposedField::from).collect();
    if let Some(entry) = fields.iter_mut().find(|field| field.id == Some(name_id)) {
        entry.attrs.label = "Full name".into();
        entry.attrs.field_type = FieldType::Textarea;
    }
    let compatible = app
        .editor
        .save_with_retry(owner, form.id, fields, None, app.retry_attempts)
        .await?;
    info!(version = compatible.new_version, changed = compatible.version_changed, "compatible edit");

    // Dropping the email field freezes version 1 and opens version 2.
    let fields: Vec<ProposedField> = compatible
        .fields
        .iter()
        .filter(|field| field.id != email_id)
        .map(ProposedField::from)
        .collect();
    let breaking = app
        .editor
        .save_with_retry(owner, form.id, fields, None, app.retry_attempts)
        .await?;
    if let Some(reason) = &breaking.break_reason {
        info!(%reason, version = breaking.new_version, "breaking edit");
    }

    let second = app
        .responses
        .submit(
            form.id,
            Submitter::User { user_id: UserId::new() },
            ResponseContent::with_answers(vec![
                FieldAnswer::single(name_id, "Bruno"),
                FieldAnswer::single(score_id, "6"),
            ]),
        )
        .await?;

    println!("# response collected under version {}", first.form_version);
    print_json(&app.responses.view(first.id, owner).await?)?;
    println!("# response collected under version {}", second.form_version);
    print_json(&app.responses.view(second.id, owner).await?)?;
    println!("# version history");
    print_json(&app.history.history(form.id, owner).await?)?;
    println!("# metrics");
    print!("{}", services::metrics::render(&app.registry)?);
    Ok(())
}
