use crate::infra::load_registry;
use chrono::SecondsFormat;
use clap::Args;
use role_verification::error::AppError;
use role_verification::workflows::verification::{
    Caller, DocumentDraft, DocumentType, FileStore, FileUpload, InMemoryFileStore,
    InMemoryVerificationRepository, NotificationPublisher, RecordingNotifier, RoleName,
    RolePolicyRegistry, VerificationOrchestrator, VerificationRepository,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Role the demo applicant registers with.
    #[arg(long, default_value = "advocate")]
    pub(crate) role: String,
    /// User id for the demo applicant.
    #[arg(long, default_value = "demo-applicant")]
    pub(crate) user: String,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicyShowArgs {
    /// CSV role table to load instead of the built-in one.
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
    /// Emit the table as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct PolicyRow {
    pub(crate) role: String,
    pub(crate) auto_verify: bool,
    pub(crate) required: Vec<String>,
    pub(crate) optional: Vec<String>,
}

pub(crate) fn run_policy_show(args: PolicyShowArgs) -> Result<(), AppError> {
    let registry = load_registry(args.path.as_deref())?;
    let rows = policy_rows(&registry);

    if args.json {
        let rendered = serde_json::to_string_pretty(&rows).map_err(std::io::Error::other)?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Role policy ({} roles)", rows.len());
    for row in &rows {
        if row.auto_verify {
            println!("- {}: verified at registration", row.role);
            continue;
        }
        println!("- {}", row.role);
        println!("    required: {}", row.required.join(", "));
        if !row.optional.is_empty() {
            println!("    optional: {}", row.optional.join(", "));
        }
    }
    Ok(())
}

pub(crate) fn policy_rows(registry: &RolePolicyRegistry) -> Vec<PolicyRow> {
    registry
        .roles()
        .map(|(role, policy)| PolicyRow {
            role: role.to_string(),
            auto_verify: policy.auto_verify,
            required: labelled(registry, policy.required_types.iter()),
            optional: labelled(registry, policy.optional_types.iter()),
        })
        .collect()
}

fn labelled<'a>(
    registry: &RolePolicyRegistry,
    types: impl Iterator<Item = &'a DocumentType>,
) -> Vec<String> {
    types
        .map(|kind| format!("{} ({})", registry.label_for(kind), kind))
        .collect()
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = VerificationOrchestrator::new(
        Arc::new(InMemoryVerificationRepository::default()),
        notifier.clone(),
        Arc::new(InMemoryFileStore::default()),
    );
    let applicant = Caller::applicant(args.user);
    let reviewer = Caller::admin("demo-reviewer");
    let role = RoleName::new(&args.role);

    println!("Role verification demo");
    let record = service.register(&applicant.user_id, &role)?;
    println!(
        "- Registered {} as {} -> {} ({:.2}%)",
        record.user_id,
        record.role,
        record.status.label(),
        record.progress
    );

    if record.is_verified() {
        println!("  Role is trusted at registration; no documents required.");
        return print_statistics(&service, &reviewer);
    }

    let required: Vec<DocumentType> = service
        .registry()
        .lookup(&role)?
        .required_types
        .iter()
        .cloned()
        .collect();

    println!("\nUploading required documents");
    for document_type in &required {
        let file_name = format!("{document_type}.pdf");
        let content_type = mime_guess::from_path(&file_name).first_raw();
        let label = service.registry().label_for(document_type);
        let document = service.upload_document(
            &applicant,
            DocumentDraft {
                document_type: document_type.clone(),
                title: label.clone(),
                description: None,
            },
            FileUpload::new(file_name, content_type, b"%PDF-1.7 demo".to_vec()),
        )?;
        println!(
            "  - {} stored as {} ({})",
            label,
            document.id,
            content_type.unwrap_or("unknown type")
        );
    }

    println!("\nReviewing uploads");
    for document in service.my_documents(&applicant)? {
        service.verify_document(&reviewer, &document.id, Some("matches issuing authority"))?;
        let status = service.my_status(&applicant)?;
        println!(
            "  - verified {} -> progress {:.2}%",
            document.document_type_label, status.progress
        );
    }

    let approved = service.approve(
        &reviewer,
        &record.id,
        Some("all required documents verified"),
    )?;
    println!(
        "\nFinal decision: {} by {}",
        approved.status.label(),
        reviewer.user_id
    );
    if let Some(date) = approved.verification_date {
        println!(
            "  Verified at {}",
            date.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    println!("\nNotifications");
    for notice in notifier.events() {
        println!("  - {} -> {}", notice.template.as_str(), notice.user_id);
    }

    print_statistics(&service, &reviewer)
}

fn print_statistics<R, N, F>(
    service: &VerificationOrchestrator<R, N, F>,
    reviewer: &Caller,
) -> Result<(), AppError>
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let stats = service.statistics(reviewer)?;
    println!(
        "\nStatistics: {} total | {} verified | {} pending | {} rejected | {:.2}% verified",
        stats.overview.total,
        stats.overview.verified,
        stats.overview.pending,
        stats.overview.rejected,
        stats.verification_rate()
    );
    for entry in &stats.by_role {
        println!(
            "  - {}: {} of {} verified",
            entry.role, entry.counts.verified, entry.counts.total
        );
    }
    Ok(())
}
