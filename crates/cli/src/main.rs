use anyhow::{anyhow, bail, Context};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use clinic_core::config::{api_url_or_default, resolve_session_path};
use clinic_core::directory::{poll, DirectoryRecord, Refreshable};
use clinic_core::forms::{Form, BIRTH_DATE, CONFIRM_PASSWORD, CPF, FULL_NAME, PASSWORD, ROLE};
use clinic_core::validation::{format_cpf, format_date};
use clinic_core::{
    menu_for, ApiClient, Attendance, ClientConfig, ClinicResult, ConsultationQueue, Directory,
    FileSessionStore, LoginFlow, LoginOutcome, MenuEntry, NoticeKind, Patient, Professional,
    ReportQuery, Role, Session, SessionStore,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic call and queue client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with CPF and password
    Login {
        /// CPF, with or without punctuation
        cpf: String,
        password: String,
        /// Office to work from (doctors only)
        #[arg(long)]
        office: Option<String>,
    },
    /// Select the office you are working from
    SetOffice { office: String },
    /// Clear the stored session
    Logout,
    /// Show the logged in user
    Whoami,
    /// Show the screens available to your profile
    Menu,
    /// Manage patients
    #[command(subcommand)]
    Patients(PatientCommands),
    /// Manage professionals (administrators)
    #[command(subcommand)]
    Professionals(ProfessionalCommands),
    /// Work the attendance queue (doctors)
    #[command(subcommand)]
    Attendances(AttendanceCommands),
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Fetch the whole collection instead of one page
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long, conflicts_with = "cpf")]
    name: Option<String>,
    #[arg(long)]
    cpf: Option<String>,
}

#[derive(Args)]
struct WatchArgs {
    /// Number of refreshes before exiting
    #[arg(long, default_value_t = 6)]
    ticks: usize,
}

#[derive(Subcommand)]
enum PatientCommands {
    List(ListArgs),
    Search(SearchArgs),
    Create {
        name: String,
        cpf: String,
        /// YYYY-MM-DD
        birth_date: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        cpf: Option<String>,
        #[arg(long)]
        birth_date: Option<String>,
    },
    Delete { id: i64 },
    /// Open an attendance for a patient
    Attend { patient_id: i64 },
    /// Keep the first page refreshed
    Watch(WatchArgs),
}

#[derive(Subcommand)]
enum ProfessionalCommands {
    List(ListArgs),
    Search(SearchArgs),
    Create {
        name: String,
        cpf: String,
        /// DOCTOR, RECEPTIONIST or ADMINISTRATOR
        role: String,
        password: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        cpf: Option<String>,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    Delete { id: i64 },
    /// Attendance report for one professional
    Report {
        id: i64,
        /// Whole day, YYYY-MM-DD
        #[arg(long, conflicts_with_all = ["start", "end"])]
        day: Option<String>,
        /// "YYYY-MM-DD HH:MM"
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// "YYYY-MM-DD HH:MM"
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    Watch(WatchArgs),
}

#[derive(Subcommand)]
enum AttendanceCommands {
    List,
    /// Call a pending patient to your office
    Call {
        id: i64,
        /// Defaults to the office selected at login
        #[arg(long)]
        office: Option<u32>,
    },
    Finish { id: i64 },
    Watch(WatchArgs),
}

/// Startup configuration plus the shared client and session store.
struct App {
    config: ClientConfig,
    api: ApiClient,
    store: FileSessionStore,
}

impl App {
    fn from_env() -> anyhow::Result<Self> {
        let api_url = api_url_or_default(std::env::var("CLINIC_API_URL").ok());
        let ws_url = std::env::var("CLINIC_WS_URL").ok();
        let api_key = std::env::var("CLINIC_API_KEY").unwrap_or_default();
        let session_path =
            resolve_session_path(std::env::var_os("CLINIC_SESSION_FILE").map(PathBuf::from))?;

        let mut config = ClientConfig::new(&api_url, ws_url.as_deref(), &api_key, session_path)?;
        if let Some(secs) = env_secs("CLINIC_REQUEST_TIMEOUT_SECS")? {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        let api = ApiClient::new(&config)?;
        let store = FileSessionStore::new(config.session_path().to_path_buf());
        Ok(Self { config, api, store })
    }

    fn login_flow(&self) -> LoginFlow<ApiClient, FileSessionStore> {
        LoginFlow::new(self.api.clone(), self.store.clone())
    }

    fn session(&self) -> anyhow::Result<Session> {
        self.store
            .require()
            .context("log in first with 'clinic login <cpf> <password>'")
    }

    fn session_for(&self, entry: MenuEntry) -> anyhow::Result<Session> {
        let session = self.session()?;
        if !menu_for(session.role()).contains(&entry) {
            bail!(
                "{} is not available to {}",
                entry.title(),
                session.role().label()
            );
        }
        Ok(session)
    }
}

fn env_secs(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => Ok(Some(
            raw.trim()
                .parse()
                .with_context(|| format!("{name} must be a whole number of seconds"))?,
        )),
        Err(_) => Ok(None),
    }
}

/// One line per listed record.
trait Row {
    fn row(&self) -> String;
}

impl Row for Patient {
    fn row(&self) -> String {
        format!(
            "{:>5}  {:<36} {:<15} {}",
            self.id,
            self.full_name,
            format_cpf(&self.cpf),
            format_date(&self.birth_date)
        )
    }
}

impl Row for Professional {
    fn row(&self) -> String {
        let office = self
            .current_office
            .map(|o| format!("consultório {o}"))
            .unwrap_or_default();
        format!(
            "{:>5}  {:<36} {:<15} {:<14} {}",
            self.id,
            self.full_name,
            format_cpf(&self.cpf),
            self.role.label(),
            office
        )
    }
}

impl Row for Attendance {
    fn row(&self) -> String {
        let office = self
            .office()
            .map(|o| format!("consultório {o}"))
            .unwrap_or_default();
        format!(
            "{:>5}  {:<15} {:<36} {}  {}",
            self.id,
            self.status.label(),
            self.patient.full_name,
            self.created_at.format("%d/%m/%Y %H:%M"),
            office
        )
    }
}

fn print_rows<T: Row>(rows: &[T]) {
    if rows.is_empty() {
        println!("Nenhum registro encontrado.");
    }
    for row in rows {
        println!("{}", row.row());
    }
}

fn print_directory<R: DirectoryRecord + Row>(dir: &Directory<R, ApiClient>) {
    print_rows(dir.items());
    if !dir.is_searching() && dir.total_pages() > 1 {
        println!("Página {} de {}", dir.page(), dir.total_pages());
    }
}

fn print_notices(notices: impl IntoIterator<Item = clinic_core::Notice>) {
    for notice in notices {
        if notice.kind == NoticeKind::Success {
            println!("{}", notice.message);
        }
    }
}

/// Shows the form with its inline errors when a submission fails.
fn submitted<T>(form: &Form, result: ClinicResult<T>) -> anyhow::Result<T> {
    result.map_err(|e| {
        eprint!("{}", form.render());
        anyhow!(e.user_message())
    })
}

fn parse_minute(raw: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M")
        .with_context(|| format!("{raw:?} is not in \"YYYY-MM-DD HH:MM\" format"))
}

async fn watch<T: Refreshable>(
    model: &mut T,
    every: Duration,
    ticks: usize,
    mut show: impl FnMut(&T),
) {
    for _ in 0..ticks {
        if poll(&mut *model, every, 1).await > 0 {
            show(&*model);
        }
    }
}

async fn list<R>(dir: &mut Directory<R, ApiClient>, args: &ListArgs) -> ClinicResult<()>
where
    R: DirectoryRecord + Row,
{
    if args.all {
        dir.load_all().await?;
    } else {
        dir.load_page(args.page).await?;
    }
    print_directory(dir);
    Ok(())
}

async fn search<R>(dir: &mut Directory<R, ApiClient>, args: &SearchArgs) -> anyhow::Result<()>
where
    R: DirectoryRecord + Row,
{
    match (&args.name, &args.cpf) {
        (Some(name), None) => dir.search_by_name(name).await?,
        (None, Some(cpf)) => dir.search_by_cpf(cpf).await?,
        _ => bail!("search needs either --name or --cpf"),
    }
    print_directory(dir);
    Ok(())
}

async fn delete<R>(dir: &mut Directory<R, ApiClient>, id: i64) -> ClinicResult<()>
where
    R: DirectoryRecord,
{
    dir.open_delete(id);
    dir.delete(id).await?;
    print_notices(dir.take_notices());
    Ok(())
}

/// Fills only the fields that were given, leaving the rest as listed.
fn apply(form: &mut Form, values: &[(&str, &Option<String>)]) {
    for (name, value) in values {
        if let Some(value) = value {
            form.set(name, value);
        }
    }
}

async fn run_patients(app: &App, command: PatientCommands) -> anyhow::Result<()> {
    let session = app.session_for(MenuEntry::Patients)?;
    let mut dir: Directory<Patient, ApiClient> = Directory::new(app.api.clone(), session);

    match command {
        PatientCommands::List(args) => list(&mut dir, &args).await?,
        PatientCommands::Search(args) => search(&mut dir, &args).await?,
        PatientCommands::Create {
            name,
            cpf,
            birth_date,
        } => {
            let mut form = dir.open_create();
            form.set(FULL_NAME, &name);
            form.set(CPF, &cpf);
            form.set(BIRTH_DATE, &birth_date);
            let result = dir.create(&mut form).await;
            let patient = submitted(&form, result)?;
            print_notices(dir.take_notices());
            println!("{}", patient.row());
        }
        PatientCommands::Update {
            id,
            name,
            cpf,
            birth_date,
        } => {
            dir.load_all().await?;
            let mut form = dir.open_edit(id)?;
            apply(
                &mut form,
                &[(FULL_NAME, &name), (CPF, &cpf), (BIRTH_DATE, &birth_date)],
            );
            let result = dir.update(id, &mut form).await;
            let patient = submitted(&form, result)?;
            print_notices(dir.take_notices());
            println!("{}", patient.row());
        }
        PatientCommands::Delete { id } => delete(&mut dir, id).await?,
        PatientCommands::Attend { patient_id } => {
            dir.create_attendance(patient_id).await?;
            print_notices(dir.take_notices());
        }
        PatientCommands::Watch(args) => {
            dir.load_page(1).await?;
            print_directory(&dir);
            let every = app.config.list_poll_interval();
            watch(&mut dir, every, args.ticks, |dir| {
                println!();
                print_directory(dir);
            })
            .await;
        }
    }
    Ok(())
}

async fn run_professionals(app: &App, command: ProfessionalCommands) -> anyhow::Result<()> {
    let session = app.session_for(MenuEntry::Professionals)?;
    let mut dir: Directory<Professional, ApiClient> = Directory::new(app.api.clone(), session);

    match command {
        ProfessionalCommands::List(args) => list(&mut dir, &args).await?,
        ProfessionalCommands::Search(args) => search(&mut dir, &args).await?,
        ProfessionalCommands::Create {
            name,
            cpf,
            role,
            password,
        } => {
            let mut form = dir.open_create();
            form.set(FULL_NAME, &name);
            form.set(CPF, &cpf);
            form.set(ROLE, &role.to_uppercase());
            form.set(PASSWORD, &password);
            form.set(CONFIRM_PASSWORD, &password);
            let result = dir.create(&mut form).await;
            let professional = submitted(&form, result)?;
            print_notices(dir.take_notices());
            println!("{}", professional.row());
        }
        ProfessionalCommands::Update {
            id,
            name,
            cpf,
            role,
            password,
        } => {
            dir.load_all().await?;
            let mut form = dir.open_edit(id)?;
            let role = role.map(|r| r.to_uppercase());
            apply(
                &mut form,
                &[
                    (FULL_NAME, &name),
                    (CPF, &cpf),
                    (ROLE, &role),
                    (PASSWORD, &password),
                    (CONFIRM_PASSWORD, &password),
                ],
            );
            let result = dir.update(id, &mut form).await;
            let professional = submitted(&form, result)?;
            print_notices(dir.take_notices());
            println!("{}", professional.row());
        }
        ProfessionalCommands::Delete { id } => delete(&mut dir, id).await?,
        ProfessionalCommands::Report {
            id,
            day,
            start,
            end,
        } => {
            let query = match (day, start, end) {
                (Some(day), None, None) => {
                    let day = NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d")
                        .with_context(|| format!("{day:?} is not in YYYY-MM-DD format"))?;
                    ReportQuery::for_day(id, day)
                }
                (None, Some(start), Some(end)) => {
                    ReportQuery::new(id, parse_minute(&start)?, parse_minute(&end)?)?
                }
                _ => bail!("report needs --day or both --start and --end"),
            };
            dir.open_report(id);
            let report = dir.report(&query).await;
            dir.close_dialog();
            let report = report?;

            println!(
                "{} atendimento(s) entre {} e {}",
                report.count,
                query.start.format("%d/%m/%Y %H:%M"),
                query.end.format("%d/%m/%Y %H:%M")
            );
            for entry in &report.attendances {
                let patient = entry
                    .patient
                    .as_ref()
                    .map(|p| p.full_name.as_str())
                    .unwrap_or("-");
                println!(
                    "{:>5}  {:<15} {:<36} {}",
                    entry.id,
                    entry.status.label(),
                    patient,
                    entry.created_at.format("%d/%m/%Y %H:%M")
                );
            }
        }
        ProfessionalCommands::Watch(args) => {
            dir.load_page(1).await?;
            print_directory(&dir);
            let every = app.config.list_poll_interval();
            watch(&mut dir, every, args.ticks, |dir| {
                println!();
                print_directory(dir);
            })
            .await;
        }
    }
    Ok(())
}

async fn run_attendances(app: &App, command: AttendanceCommands) -> anyhow::Result<()> {
    let session = app.session_for(MenuEntry::MedicalConsultation)?;
    let mut queue = ConsultationQueue::new(app.api.clone(), session);
    queue.refresh().await?;

    match command {
        AttendanceCommands::List => print_rows(queue.attendances()),
        AttendanceCommands::Call { id, office } => {
            let office = office
                .or_else(|| queue.session().office())
                .context("select an office first with 'clinic set-office <number>'")?;
            queue.call(id, office).await?;
            print_notices(queue.take_notices());
        }
        AttendanceCommands::Finish { id } => {
            let professional_id = queue.session().user.id;
            queue.finish(id, professional_id).await?;
            print_notices(queue.take_notices());
        }
        AttendanceCommands::Watch(args) => {
            print_rows(queue.attendances());
            let every = app.config.attendance_poll_interval();
            watch(&mut queue, every, args.ticks, |queue| {
                println!();
                print_rows(queue.attendances());
            })
            .await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'clinic --help' for commands");
        return Ok(());
    };

    let app = App::from_env()?;
    match command {
        Commands::Login {
            cpf,
            password,
            office,
        } => {
            let flow = app.login_flow();
            let (mut session, outcome) = flow.login(&cpf, &password).await?;
            println!(
                "Bem-vindo(a), {} ({})",
                session.user.full_name,
                session.role().label()
            );
            match (outcome, office) {
                (LoginOutcome::OfficeSelection { .. }, Some(office)) => {
                    flow.select_office(&mut session, &office).await?;
                    println!("Consultório {} selecionado", office.trim());
                }
                (LoginOutcome::OfficeSelection { suggested }, None) => {
                    let hint = suggested
                        .map(|o| format!(" (último: {o})"))
                        .unwrap_or_default();
                    println!("Selecione o consultório com 'clinic set-office <número>'{hint}");
                }
                (LoginOutcome::Dashboard, _) => {}
            }
        }
        Commands::SetOffice { office } => {
            let mut session = app.session()?;
            if session.role() != Role::Doctor {
                bail!("only doctors work from an office");
            }
            app.login_flow().select_office(&mut session, &office).await?;
            println!("Consultório {} selecionado", office.trim());
        }
        Commands::Logout => {
            app.login_flow().logout()?;
            println!("Sessão encerrada");
        }
        Commands::Whoami => {
            let session = app.session()?;
            println!("{} ({})", session.user.full_name, session.role().label());
            println!("CPF: {}", format_cpf(&session.user.cpf));
            if let Some(office) = session.office() {
                println!("Consultório: {office}");
            }
        }
        Commands::Menu => {
            let session = app.session()?;
            for entry in menu_for(session.role()) {
                println!("{:<20} {}", entry.title(), entry.description());
            }
        }
        Commands::Patients(command) => run_patients(&app, command).await?,
        Commands::Professionals(command) => run_professionals(&app, command).await?,
        Commands::Attendances(command) => run_attendances(&app, command).await?,
    }

    Ok(())
}
