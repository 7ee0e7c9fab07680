use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use mediport_client::{Client, FileStorage, SessionContext};

use crate::config::Config;
use crate::{commands, observability};

/// MediPort hospital operations client.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum Command {
    Login(LoginCommand),
    Logout(LogoutCommand),
    Whoami(WhoamiCommand),
    Can(CanCommand),
    Patients(PatientsCommand),
    Medications(MedicationsCommand),
    Prescriptions(PrescriptionsCommand),
    Users(UsersCommand),
    Version(VersionCommand),
}

/// log in and store the session
///
/// The username defaults to the one remembered by a previous `--remember` login. The password
/// defaults to the configured `password`.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "login")]
pub struct LoginCommand {
    /// the username to log in with
    #[argh(positional)]
    pub username: Option<String>,

    /// the password, overriding the configured one
    #[argh(option, short = 'p')]
    pub password: Option<String>,

    /// remember the username for future logins
    #[argh(switch, short = 'r')]
    pub remember: bool,
}

/// log out and discard the stored session
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "logout")]
pub struct LogoutCommand {}

/// show the current session and its permissions
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "whoami")]
pub struct WhoamiCommand {}

/// check whether the current role is granted permissions
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "can")]
pub struct CanCommand {
    /// the permissions to check, for example `view_patients`
    #[argh(positional)]
    pub permissions: Vec<String>,

    /// succeed if any of the permissions is granted instead of all of them
    #[argh(switch)]
    pub any: bool,
}

/// manage patient records
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "patients")]
pub struct PatientsCommand {
    #[argh(subcommand)]
    pub action: PatientsAction,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum PatientsAction {
    List(ListCommand),
    Add(AddCommand),
    Update(UpdateCommand),
    Delete(DeletePatientCommand),
}

/// list all records
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "list")]
pub struct ListCommand {}

/// create a record from a JSON file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "add")]
pub struct AddCommand {
    /// path to the JSON record
    #[argh(positional)]
    pub file: PathBuf,
}

/// replace a record from a JSON file
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "update")]
pub struct UpdateCommand {
    /// path to the JSON record
    #[argh(positional)]
    pub file: PathBuf,
}

/// delete a patient record
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "delete")]
pub struct DeletePatientCommand {
    /// the CNP of the patient
    #[argh(positional)]
    pub cnp: String,
}

/// manage the medication inventory
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "medications")]
pub struct MedicationsCommand {
    #[argh(subcommand)]
    pub action: MedicationsAction,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum MedicationsAction {
    List(ListCommand),
    Add(AddCommand),
}

/// manage prescriptions
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "prescriptions")]
pub struct PrescriptionsCommand {
    #[argh(subcommand)]
    pub action: PrescriptionsAction,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum PrescriptionsAction {
    List(ListPrescriptionsCommand),
    Add(AddCommand),
}

/// list prescriptions
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "list")]
pub struct ListPrescriptionsCommand {
    /// only list the prescriptions of the patient with this CNP
    #[argh(option)]
    pub patient: Option<String>,
}

/// manage staff accounts
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "users")]
pub struct UsersCommand {
    #[argh(subcommand)]
    pub action: UsersAction,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
pub enum UsersAction {
    List(ListCommand),
    Add(AddUserCommand),
}

/// create a staff account
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "add")]
pub struct AddUserCommand {
    /// the role, for example `Doctor` or `Nurse`
    #[argh(option)]
    pub role: String,

    /// family name
    #[argh(option)]
    pub last_name: String,

    /// given name
    #[argh(option)]
    pub first_name: String,

    /// email address, used to log in
    #[argh(option)]
    pub email: String,
}

/// print the client version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
pub struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", commands::VERSION);
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let client = Client::builder(config.service_url.as_str())
        .timeout(config.timeout)
        .build()?;
    let context = SessionContext::new(client, FileStorage::new(&config.session_path))?;

    runtime.block_on(async move {
        let mut stdout = std::io::stdout().lock();
        commands::run(args.command, &context, &config, &mut stdout).await
    })
}
