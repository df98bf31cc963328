use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use outreach_api::{CacheConfig, Mutation, OutreachApi};
use outreach_core::views::unique_companies;
use outreach_core::{
    ContactFilter, ContactId, ContactPage, ContactStatus, NewContact, NewTemplate, TemplateId,
    CONTACTS_PER_PAGE, DEFAULT_FOLLOWUP_INTERVAL_HOURS,
};
use serde::Serialize;
use serde_json::Value;
use time::macros::format_description;
use time::Date;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "ot")]
#[command(about = "Outreach tracker CLI")]
struct Cli {
    #[arg(long, env = "OUTREACH_DB", default_value = "./outreach.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Contact {
        #[command(subcommand)]
        command: Box<ContactCommand>,
    },
    Followup {
        #[command(subcommand)]
        command: FollowupCommand,
    },
    Template {
        #[command(subcommand)]
        command: Box<TemplateCommand>,
    },
    Stats,
    Dashboard(DashboardArgs),
    Analytics,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    Init,
    SchemaVersion,
    Reset(ConfirmArgs),
    IntegrityCheck,
    Backup(DbBackupArgs),
}

#[derive(Debug, Args)]
struct ConfirmArgs {
    #[arg(long, default_value_t = false)]
    yes: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum ContactCommand {
    Add(ContactAddArgs),
    List(ContactListArgs),
    Show(IdArgs),
    SetStatus(SetStatusArgs),
    FollowupSent(FollowupSentArgs),
    Delete(IdArgs),
    DeleteAll(ConfirmArgs),
    Dedupe,
    Import(ImportArgs),
}

#[derive(Debug, Args)]
struct ContactAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    job_title: String,
    #[arg(long, default_value = "")]
    linkedin_url: String,
    #[arg(long, default_value = "")]
    company_name: String,
    #[arg(long, default_value = "")]
    company_website: String,
    #[arg(long, default_value = "")]
    company_linkedin: String,
    #[arg(long, default_value = "")]
    company_social: String,
    #[arg(long, default_value = "")]
    company_twitter: String,
    #[arg(long, default_value = "")]
    location: String,
    #[arg(long, default_value = "")]
    company_niche: String,
    #[arg(long, value_parser = parse_date)]
    applied_date: Option<Date>,
    #[arg(long, default_value_t = DEFAULT_FOLLOWUP_INTERVAL_HOURS)]
    followup_interval: u32,
    #[arg(long, value_enum, default_value_t = StatusArg::NotApplied)]
    status: StatusArg,
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Debug, Args)]
struct ContactListArgs {
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long)]
    page: Option<usize>,
}

#[derive(Debug, Args)]
struct DashboardArgs {
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, default_value_t = 1)]
    page: usize,
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
struct SetStatusArgs {
    #[arg(long)]
    id: i64,
    #[arg(long, value_enum)]
    status: StatusArg,
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Debug, Args)]
struct FollowupSentArgs {
    #[arg(long)]
    id: i64,
    #[arg(long)]
    hours: Option<u32>,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Subcommand)]
enum FollowupCommand {
    Due,
}

#[derive(Debug, Subcommand)]
enum TemplateCommand {
    Add(TemplateAddArgs),
    List,
    Delete(IdArgs),
}

#[derive(Debug, Args)]
struct TemplateAddArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    body: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    NotApplied,
    Applied,
    FollowUpSent,
    Rejected,
    Accepted,
    NoResponse,
}

impl From<StatusArg> for ContactStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::NotApplied => Self::NotApplied,
            StatusArg::Applied => Self::Applied,
            StatusArg::FollowUpSent => Self::FollowUpSent,
            StatusArg::Rejected => Self::Rejected,
            StatusArg::Accepted => Self::Accepted,
            StatusArg::NoResponse => Self::NoResponse,
        }
    }
}

impl From<FilterArgs> for ContactFilter {
    fn from(value: FilterArgs) -> Self {
        Self {
            status: value.status.map(ContactStatus::from),
            company: value.company,
            search: value.search,
        }
    }
}

fn parse_date(value: &str) -> std::result::Result<Date, String> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&with_contract_version(value))?;
    println!("{rendered}");
    Ok(())
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
        .context("failed to serialize command output")?;
    emit_json(value)
}

fn require_confirmation(args: &ConfirmArgs, action: &str) -> Result<()> {
    if args.yes {
        Ok(())
    } else {
        Err(anyhow!("refusing to {action} without --yes"))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(db = %cli.db.display(), command = ?cli.command, "running command");
    let api = OutreachApi::open(&cli.db, CacheConfig::default())
        .with_context(|| format!("failed to open outreach database at {}", cli.db.display()))?;
    match cli.command {
        Command::Db { command } => run_db(*command, &api),
        Command::Contact { command } => run_contact(*command, &api),
        Command::Followup { command } => run_followup(&command, &api),
        Command::Template { command } => run_template(*command, &api),
        Command::Stats => emit(&*api.load_stats()?),
        Command::Dashboard(args) => {
            let filter = ContactFilter::from(args.filter);
            emit(&api.load_dashboard(&filter, args.page)?)
        }
        Command::Analytics => emit(&api.load_analytics()?),
    }
}

fn run_db(command: DbCommand, api: &OutreachApi) -> Result<()> {
    match command {
        DbCommand::Init => {
            api.init_schema()?;
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "initialized": true,
                "current_version": status.current_version,
                "target_version": status.target_version
            }))
        }
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "up_to_date": status.is_current(),
                "tables": status.tables,
                "missing_columns": status.missing_columns
            }))
        }
        DbCommand::Reset(args) => {
            require_confirmation(&args, "reset the database")?;
            api.reset_database()?;
            api.invalidate_after(Mutation::ResetDatabase);
            emit_json(serde_json::json!({ "reset": true }))
        }
        DbCommand::IntegrityCheck => emit(&api.integrity_check()?),
        DbCommand::Backup(args) => {
            api.backup_database(&args.out)?;
            emit_json(serde_json::json!({ "backup": args.out.display().to_string() }))
        }
    }
}

fn run_contact(command: ContactCommand, api: &OutreachApi) -> Result<()> {
    match command {
        ContactCommand::Add(args) => {
            let contact = NewContact {
                name: args.name,
                job_title: args.job_title,
                linkedin_url: args.linkedin_url,
                company_name: args.company_name,
                company_website: args.company_website,
                company_linkedin: args.company_linkedin,
                company_social: args.company_social,
                company_twitter: args.company_twitter,
                location: args.location,
                company_niche: args.company_niche,
                applied_date: args.applied_date,
                followup_interval: args.followup_interval,
                status: args.status.into(),
                notes: args.notes,
            };
            let id = api.insert_contact(&contact)?;
            api.invalidate_after(Mutation::InsertContact);
            emit_json(serde_json::json!({ "contact": api.get_contact(id)? }))
        }
        ContactCommand::List(args) => {
            let contacts = api.load_contacts()?;
            let filter = ContactFilter::from(args.filter);
            let matching = filter.apply(&contacts);
            match args.page {
                Some(page) => emit(&ContactPage::paginate(&matching, page, CONTACTS_PER_PAGE)),
                None => emit_json(serde_json::json!({
                    "total": matching.len(),
                    "companies": unique_companies(&contacts),
                    "contacts": matching
                })),
            }
        }
        ContactCommand::Show(args) => {
            emit_json(serde_json::json!({ "contact": api.get_contact(ContactId(args.id))? }))
        }
        ContactCommand::SetStatus(args) => {
            let id = ContactId(args.id);
            api.update_contact_status(id, args.status.into(), &args.notes)?;
            api.invalidate_after(Mutation::UpdateContactStatus);
            emit_json(serde_json::json!({ "contact": api.get_contact(id)? }))
        }
        ContactCommand::FollowupSent(args) => {
            let contact = api.mark_followup_sent(ContactId(args.id), args.hours)?;
            api.invalidate_after(Mutation::MarkFollowupSent);
            emit_json(serde_json::json!({ "contact": contact }))
        }
        ContactCommand::Delete(args) => {
            api.delete_contact(ContactId(args.id))?;
            api.invalidate_after(Mutation::DeleteContact);
            emit_json(serde_json::json!({ "deleted": args.id }))
        }
        ContactCommand::DeleteAll(args) => {
            require_confirmation(&args, "delete every contact")?;
            let deleted = api.delete_all_contacts()?;
            api.invalidate_after(Mutation::DeleteAllContacts);
            emit_json(serde_json::json!({ "deleted": deleted }))
        }
        ContactCommand::Dedupe => {
            let removed = api.remove_duplicate_contacts()?;
            api.invalidate_after(Mutation::RemoveDuplicateContacts);
            emit_json(serde_json::json!({ "removed": removed }))
        }
        ContactCommand::Import(args) => {
            let summary = api.import_file(&args.file)?;
            api.invalidate_after(Mutation::InsertContactsBulk);
            emit(&summary)
        }
    }
}

fn run_followup(command: &FollowupCommand, api: &OutreachApi) -> Result<()> {
    match command {
        FollowupCommand::Due => {
            let due = api.load_due_followups()?;
            emit_json(serde_json::json!({ "count": due.len(), "due": *due }))
        }
    }
}

fn run_template(command: TemplateCommand, api: &OutreachApi) -> Result<()> {
    match command {
        TemplateCommand::Add(args) => {
            let id = api.add_template(&NewTemplate {
                title: args.title,
                body: args.body,
            })?;
            api.invalidate_after(Mutation::AddTemplate);
            emit_json(serde_json::json!({ "template_id": id }))
        }
        TemplateCommand::List => {
            let templates = api.load_templates()?;
            emit_json(serde_json::json!({ "templates": *templates }))
        }
        TemplateCommand::Delete(args) => {
            api.delete_template(TemplateId(args.id))?;
            api.invalidate_after(Mutation::DeleteTemplate);
            emit_json(serde_json::json!({ "deleted": args.id }))
        }
    }
}
