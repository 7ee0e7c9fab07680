//! Subcommand implementations.
//!
//! Every command that touches a protected endpoint first checks that the session's role is
//! granted the matching [`Permission`], and refuses without contacting the backend otherwise.
//! These checks only mirror what the dashboard shows. The backend authorizes every request on
//! its own.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use mediport_client::{AuthError, Authorized, Error, NewUser, SessionContext};
use mediport_types::{Permission, Role, auth};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

use crate::cli::{
    AddCommand, AddUserCommand, CanCommand, Command, DeletePatientCommand, ListCommand,
    ListPrescriptionsCommand, LoginCommand, MedicationsAction, MedicationsCommand,
    PatientsAction, PatientsCommand, PrescriptionsAction, PrescriptionsCommand, UpdateCommand,
    UsersAction, UsersCommand,
};
use crate::config::Config;

/// The version printed by `mediport version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs a single command against `context`, writing its output to `out`.
pub async fn run(
    command: Command,
    context: &SessionContext,
    config: &Config,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Command::Login(command) => login(command, context, config, out).await,
        Command::Logout(_) => {
            context.logout()?;
            writeln!(out, "logged out")?;
            Ok(())
        }
        Command::Whoami(_) => whoami(context, out),
        Command::Can(command) => can(command, context, out),
        Command::Patients(PatientsCommand { action }) => {
            let authorized = context.require().map_err(hint)?;
            patients(action, &authorized, out).await
        }
        Command::Medications(MedicationsCommand { action }) => {
            let authorized = context.require().map_err(hint)?;
            medications(action, &authorized, out).await
        }
        Command::Prescriptions(PrescriptionsCommand { action }) => {
            let authorized = context.require().map_err(hint)?;
            prescriptions(action, &authorized, out).await
        }
        Command::Users(UsersCommand { action }) => {
            let authorized = context.require().map_err(hint)?;
            users(action, &authorized, out).await
        }
        Command::Version(_) => {
            writeln!(out, "{VERSION}")?;
            Ok(())
        }
    }
}

/// Adds instructions for the user to session errors.
fn hint(error: Error) -> anyhow::Error {
    let hint = match &error {
        Error::Auth(AuthError::SessionExpired) => {
            "your session has expired, run `mediport login` to log in again"
        }
        Error::Auth(AuthError::LoginRequired) => "not logged in, run `mediport login` first",
        _ => return error.into(),
    };
    anyhow::Error::new(error).context(hint)
}

/// Permissions that allow admitting, editing and removing patients.
///
/// Receptionists handle admissions and bed assignment, doctors manage their patients. Either
/// one may change patient records.
const EDIT_PATIENTS: [Permission; 2] = [Permission::AssignBeds, Permission::ManagePatients];

/// Fails unless the role is granted at least one of `permissions`.
fn ensure(authorized: &Authorized, permissions: &[Permission]) -> Result<()> {
    if authorized.can_any(permissions) {
        return Ok(());
    }

    let names = permissions
        .iter()
        .map(|permission| format!("`{permission}`"))
        .collect::<Vec<_>>()
        .join(" or ");
    match authorized.role() {
        Some(role) => bail!("the {role} role is not granted {names}"),
        None => bail!("your account has no recognized role, {names} is not granted"),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("invalid record in {}", path.display()))
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

async fn login(
    command: LoginCommand,
    context: &SessionContext,
    config: &Config,
    out: &mut impl Write,
) -> Result<()> {
    let Some(username) = command.username.or_else(|| context.session().username) else {
        bail!("no username given and none remembered");
    };

    let password = match (&command.password, &config.password) {
        (Some(password), _) => password.as_str(),
        (None, Some(password)) => password.expose_secret().as_str(),
        (None, None) => bail!("no password given, pass `--password` or set `MP__PASSWORD`"),
    };

    let session = if command.remember {
        context.login_remembered(&username, password).await?
    } else {
        context.login(&username, password).await?
    };

    match session.role {
        Some(role) => writeln!(out, "logged in as {username} ({role})")?,
        None => writeln!(
            out,
            "logged in as {username}, but the account has no recognized role"
        )?,
    }
    Ok(())
}

fn whoami(context: &SessionContext, out: &mut impl Write) -> Result<()> {
    let session = context.reload()?;
    if !session.is_authenticated() {
        writeln!(out, "not logged in")?;
        return Ok(());
    }

    let username = session.username.as_deref().unwrap_or("(not remembered)");
    let role = session.role.map_or("unknown", |role| role.name());
    writeln!(out, "username: {username}")?;
    writeln!(out, "role: {role}")?;

    let mut granted: Vec<_> = auth::default_table()
        .permissions(session.role)
        .iter()
        .map(|permission| permission.as_str())
        .collect();
    granted.sort_unstable();
    writeln!(out, "permissions: {}", granted.join(", "))?;
    Ok(())
}

fn can(command: CanCommand, context: &SessionContext, out: &mut impl Write) -> Result<()> {
    let permissions = command
        .permissions
        .iter()
        .map(|name| {
            Permission::from_name(name).with_context(|| format!("unknown permission `{name}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let session = context.reload()?;
    let role = session.is_authenticated().then_some(session.role).flatten();
    let granted = if command.any {
        auth::has_any_permission(role, &permissions)
    } else {
        auth::has_all_permissions(role, &permissions)
    };

    writeln!(out, "{}", if granted { "granted" } else { "denied" })?;
    Ok(())
}

async fn patients(
    action: PatientsAction,
    authorized: &Authorized,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        PatientsAction::List(ListCommand {}) => {
            ensure(authorized, &[Permission::ViewPatients])?;
            for patient in authorized.list_patients().await.map_err(hint)? {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    patient.cnp,
                    patient.full_name(),
                    or_dash(&patient.bed)
                )?;
            }
        }
        PatientsAction::Add(AddCommand { file }) => {
            ensure(authorized, &EDIT_PATIENTS)?;
            let patient = read_json(&file)?;
            authorized.create_patient(&patient).await.map_err(hint)?;
            writeln!(out, "created patient {}", patient.cnp)?;
        }
        PatientsAction::Update(UpdateCommand { file }) => {
            ensure(authorized, &EDIT_PATIENTS)?;
            let patient = read_json(&file)?;
            authorized.update_patient(&patient).await.map_err(hint)?;
            writeln!(out, "updated patient {}", patient.cnp)?;
        }
        PatientsAction::Delete(DeletePatientCommand { cnp }) => {
            ensure(authorized, &EDIT_PATIENTS)?;
            authorized.delete_patient(&cnp).await.map_err(hint)?;
            writeln!(out, "deleted patient {cnp}")?;
        }
    }
    Ok(())
}

async fn medications(
    action: MedicationsAction,
    authorized: &Authorized,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        MedicationsAction::List(ListCommand {}) => {
            ensure(authorized, &[Permission::ViewMedications])?;
            for medication in authorized.list_medications().await.map_err(hint)? {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{} in stock",
                    medication.code,
                    medication.name,
                    or_dash(&medication.concentration),
                    medication.stock
                )?;
            }
        }
        MedicationsAction::Add(AddCommand { file }) => {
            ensure(authorized, &[Permission::ManageMedications])?;
            let medication = read_json(&file)?;
            authorized
                .create_medication(&medication)
                .await
                .map_err(hint)?;
            writeln!(out, "created medication {}", medication.code)?;
        }
    }
    Ok(())
}

async fn prescriptions(
    action: PrescriptionsAction,
    authorized: &Authorized,
    out: &mut impl Write,
) -> Result<()> {
    match action {
        PrescriptionsAction::List(ListPrescriptionsCommand { patient }) => {
            ensure(authorized, &[Permission::ViewPatients])?;
            let prescriptions = match patient {
                Some(cnp) => authorized.list_prescriptions_for(&cnp).await,
                None => authorized.list_prescriptions().await,
            }
            .map_err(hint)?;

            for prescription in prescriptions {
                writeln!(
                    out,
                    "{}\t{}\tmedication {}\t{}",
                    prescription.id,
                    prescription.patient_cnp,
                    prescription.medication_id,
                    prescription.quantity
                )?;
            }
        }
        PrescriptionsAction::Add(AddCommand { file }) => {
            ensure(authorized, &[Permission::ManagePatients])?;
            let prescription = read_json(&file)?;
            authorized
                .create_prescription(&prescription)
                .await
                .map_err(hint)?;
            writeln!(out, "created prescription for {}", prescription.patient_cnp)?;
        }
    }
    Ok(())
}

async fn users(action: UsersAction, authorized: &Authorized, out: &mut impl Write) -> Result<()> {
    ensure(authorized, &[Permission::ManageUsers])?;

    match action {
        UsersAction::List(ListCommand {}) => {
            for user in authorized.list_users().await.map_err(hint)? {
                let role = match user.role() {
                    Some(role) => role.to_string(),
                    None => format!("unknown role `{}`", user.role_code),
                };
                writeln!(out, "{}\t{}\t{role}", user.email, user.full_name())?;
            }
        }
        UsersAction::Add(AddUserCommand {
            role,
            last_name,
            first_name,
            email,
        }) => {
            let Some(role) = Role::from_name(&role) else {
                bail!("unknown role `{role}`");
            };
            let user = NewUser {
                role,
                last_name,
                first_name,
                email,
            };
            authorized.create_user(&user).await.map_err(hint)?;
            writeln!(out, "created user {}", user.email)?;
        }
    }
    Ok(())
}
