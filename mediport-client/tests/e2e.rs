use std::time::Duration;

use mediport_client::{
    AccessToken, AuthError, Client, DecodeError, Error, FileStorage, Medication, MemoryStorage,
    NewUser, Patient, Prescription, Session, SessionContext, SessionStorage,
};
use mediport_test::server::TestServer;
use mediport_types::role_code::frontend_role_to_backend;
use mediport_types::{Permission, Role};
use reqwest::StatusCode;
use serde_json::json;

fn context(server: &TestServer, storage: impl SessionStorage + 'static) -> SessionContext {
    mediport_test::tracing::init();
    let client = Client::builder(server.url("/")).build().unwrap();
    SessionContext::new(client, storage).unwrap()
}

async fn logged_in(server: &TestServer, username: &str) -> SessionContext {
    let context = context(server, MemoryStorage::new());
    context
        .login(username, &TestServer::password(username))
        .await
        .unwrap();
    context
}

fn patient(cnp: &str) -> Patient {
    Patient {
        cnp: cnp.into(),
        last_name: "Popescu".into(),
        first_name: "Ion".into(),
        county: "Cluj".into(),
        blood_type: "A".into(),
        rh: "pozitiv".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn login_decodes_role() {
    let server = TestServer::new().await;
    let context = context(&server, MemoryStorage::new());

    let session = context
        .login("admin", &TestServer::password("admin"))
        .await
        .unwrap();

    assert!(session.is_authenticated());
    assert_eq!(session.role, Some(Role::Administrator));
    assert_eq!(session.scheme, "bearer");
    assert_eq!(session.username, None);
    assert_eq!(context.session(), session);
}

#[tokio::test]
async fn login_with_unknown_role_code() {
    let server = TestServer::new().await;

    for username in ["mystery", "legacy"] {
        let context = logged_in(&server, username).await;
        let session = context.session();
        assert!(session.is_authenticated());
        assert_eq!(session.role, None);

        let authorized = context.require().unwrap();
        for permission in Permission::ALL {
            assert!(!authorized.can(permission));
        }
    }
}

#[tokio::test]
async fn login_defaults_scheme() {
    let server = TestServer::new().await;
    server.omit_token_type(true);
    let context = context(&server, MemoryStorage::new());

    let session = context
        .login("nurse", &TestServer::password("nurse"))
        .await
        .unwrap();
    assert_eq!(session.scheme, "Bearer");
    assert!(session.authorization().unwrap().starts_with("Bearer "));

    let authorized = context.require().unwrap();
    assert!(authorized.list_patients().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_surfaces_server_errors() {
    let server = TestServer::new().await;
    server.fail_logins(true);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let context = context(&server, FileStorage::new(&path));

    let result = context.login("doctor", &TestServer::password("doctor")).await;
    let Err(Error::UnexpectedStatus { status, message }) = result else {
        panic!("expected unexpected status, got {result:?}");
    };
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(message.as_deref(), Some("Database unavailable"));
    assert!(!path.exists());
    assert!(!context.session().logged_in);
}

#[tokio::test]
async fn login_rejects_invalid_credentials() {
    let server = TestServer::new().await;
    let context = context(&server, MemoryStorage::new());

    let result = context.login("admin", "wrong").await;
    let Err(Error::Auth(AuthError::InvalidCredentials(message))) = result else {
        panic!("expected invalid credentials, got {result:?}");
    };
    assert_eq!(message, "Incorrect username or password");
    assert!(!context.session().is_authenticated());
}

#[tokio::test]
async fn login_without_token_writes_nothing() {
    let server = TestServer::new().await;
    server.omit_token(true);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let context = context(&server, FileStorage::new(&path));

    let result = context.login("doctor", &TestServer::password("doctor")).await;
    assert!(matches!(result, Err(Error::Auth(AuthError::MissingToken))));
    assert!(!path.exists());
    assert!(!context.session().logged_in);
}

#[tokio::test]
async fn session_survives_restart() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let first = context(&server, FileStorage::new(&path));
    first
        .login_remembered("nurse", &TestServer::password("nurse"))
        .await
        .unwrap();

    let second = context(&server, FileStorage::new(&path));
    let session = second.session();
    assert!(session.is_authenticated());
    assert_eq!(session.role, Some(Role::Nurse));

    second.logout().unwrap();
    let session = first.reload().unwrap();
    assert!(!session.is_authenticated());
    assert_eq!(session.role, None);
    assert_eq!(session.username.as_deref(), Some("nurse"));
}

#[tokio::test]
async fn login_replaces_unreadable_session_file() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"{"token": "eyJhbGciOi"#).unwrap();

    let context = context(&server, FileStorage::new(&path));
    assert!(!context.session().is_authenticated());

    context
        .login("doctor", &TestServer::password("doctor"))
        .await
        .unwrap();

    let stored = FileStorage::new(&path).load().unwrap().unwrap();
    assert!(stored.is_authenticated());
    assert_eq!(stored.role, Some(Role::Doctor));
}

#[tokio::test]
async fn uses_previously_stored_token() {
    let server = TestServer::new().await;
    let code = frontend_role_to_backend(Role::Doctor).map(|code| code.as_char());
    let storage = MemoryStorage::new();
    storage
        .store(&Session {
            token: Some(AccessToken::new(server.token_for("doctor", code))),
            logged_in: true,
            role: Some(Role::Doctor),
            ..Default::default()
        })
        .unwrap();
    server.seed_patient(json!({
        "CNP": "1900101123456",
        "nume": "Popescu",
        "prenume": "Ion",
        "id_pat": "A-3",
    }));

    let authorized = context(&server, storage).require().unwrap();
    let patients = authorized.list_patients().await.unwrap();
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].bed, "A-3");
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn require_without_session_sends_nothing() {
    let server = TestServer::new().await;
    let context = context(&server, MemoryStorage::new());

    let result = context.require();
    assert!(matches!(result, Err(Error::Auth(AuthError::LoginRequired))));
    assert_eq!(server.requests(), 0);
}

#[tokio::test]
async fn logout_blocks_protected_operations() {
    let server = TestServer::new().await;
    let context = logged_in(&server, "doctor").await;
    let requests = server.requests();

    context.logout().unwrap();

    let result = context.require();
    assert!(matches!(result, Err(Error::Auth(AuthError::LoginRequired))));
    assert_eq!(server.requests(), requests);
}

#[tokio::test]
async fn rejected_token_expires_session() {
    let server = TestServer::new().await;
    let context = logged_in(&server, "doctor").await;
    let mut changes = context.subscribe();
    let authorized = context.require().unwrap();

    server.reject_tokens(true);
    let result = authorized.list_patients().await;
    assert!(matches!(result, Err(Error::Auth(AuthError::SessionExpired))));

    assert!(changes.has_changed().unwrap());
    assert!(!changes.borrow_and_update().is_authenticated());
    assert!(matches!(
        context.require(),
        Err(Error::Auth(AuthError::LoginRequired))
    ));
}

#[tokio::test]
async fn stale_rejection_keeps_newer_login() {
    let server = TestServer::new().await;
    let context = logged_in(&server, "doctor").await;
    let stale = context.require().unwrap();
    let stale_token = stale.session().token.clone().unwrap();

    context
        .login("nurse", &TestServer::password("nurse"))
        .await
        .unwrap();
    server.revoke(stale_token.as_str());

    let result = stale.list_patients().await;
    assert!(matches!(result, Err(Error::Auth(AuthError::SessionExpired))));

    let session = context.session();
    assert!(session.is_authenticated());
    assert_eq!(session.role, Some(Role::Nurse));
}

#[tokio::test]
async fn subscribers_see_login() {
    let server = TestServer::new().await;
    let context = context(&server, MemoryStorage::new());
    let mut changes = context.subscribe();
    assert!(!changes.has_changed().unwrap());

    context
        .login("pharmacist", &TestServer::password("pharmacist"))
        .await
        .unwrap();

    assert!(changes.has_changed().unwrap());
    assert_eq!(changes.borrow_and_update().role, Some(Role::Pharmacist));
}

#[tokio::test]
async fn manages_patients() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "doctor").await.require().unwrap();
    assert!(authorized.can(Permission::ManagePatients));

    authorized.create_patient(&patient("1900101123456")).await.unwrap();
    authorized.create_patient(&patient("2900101123456")).await.unwrap();

    let patients = authorized.list_patients().await.unwrap();
    assert_eq!(patients.len(), 2);
    assert_eq!(patients[0].full_name(), "Popescu Ion");
    assert_eq!(patients[0].county, "Cluj");

    let mut updated = patient("1900101123456");
    updated.bed = "B-12".into();
    authorized.update_patient(&updated).await.unwrap();
    assert_eq!(server.patients()[0]["id_pat"], "B-12");

    authorized.delete_patient("2900101123456").await.unwrap();
    let patients = authorized.list_patients().await.unwrap();
    assert_eq!(patients, vec![updated]);
}

#[tokio::test]
async fn surfaces_backend_errors() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "receptionist").await.require().unwrap();

    let result = authorized.delete_patient("1900101123456").await;
    let Err(Error::UnexpectedStatus { status, message }) = result else {
        panic!("expected unexpected status, got {result:?}");
    };
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(message.as_deref(), Some("Patient not found"));

    // Not a session problem, so the session stays.
    assert!(authorized.session().is_authenticated());
}

#[tokio::test]
async fn validates_before_sending() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "doctor").await.require().unwrap();
    let requests = server.requests();

    let result = authorized.create_patient(&patient("")).await;
    assert!(matches!(result, Err(Error::Validation { field: "CNP" })));

    let result = authorized.create_medication(&Medication::default()).await;
    assert!(matches!(
        result,
        Err(Error::Validation {
            field: "id_medicament"
        })
    ));

    let result = authorized.create_prescription(&Prescription::default()).await;
    assert!(matches!(result, Err(Error::Validation { field: "cantitate" })));

    assert_eq!(server.requests(), requests);
}

#[tokio::test]
async fn rejects_duplicate_submission() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "doctor").await.require().unwrap();
    server.delay(Duration::from_millis(50));

    let record = patient("1900101123456");
    let (first, second) = tokio::join!(
        authorized.create_patient(&record),
        authorized.create_patient(&record),
    );

    first.unwrap();
    assert!(matches!(second, Err(Error::InFlight(_))));
    assert_eq!(server.patients().len(), 1);

    // The guard is released once the request completes.
    authorized.update_patient(&record).await.unwrap();
}

#[tokio::test]
async fn rejects_concurrent_login() {
    let server = TestServer::new().await;
    server.delay(Duration::from_millis(50));
    let context = context(&server, MemoryStorage::new());
    let password = TestServer::password("admin");

    let (first, second) = tokio::join!(
        context.login("admin", &password),
        context.login("admin", &password),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::InFlight(_))));
}

#[tokio::test]
async fn manages_medications() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "pharmacist").await.require().unwrap();

    let medication = Medication {
        code: "PARA500".into(),
        name: "Paracetamol".into(),
        concentration: "500mg".into(),
        price: 12.5,
        stock: 40,
        available: true,
        ..Default::default()
    };
    authorized.create_medication(&medication).await.unwrap();

    let medications = authorized.list_medications().await.unwrap();
    assert_eq!(medications.len(), 1);
    assert_eq!(medications[0].id, Some(1));
    assert_eq!(medications[0].name, "Paracetamol");
    assert_eq!(medications[0].stock, 40);
}

#[tokio::test]
async fn manages_prescriptions() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "doctor").await.require().unwrap();

    for (cnp, quantity) in [("1900101123456", "2x daily"), ("2900101123456", "1 box")] {
        let prescription = Prescription {
            quantity: quantity.into(),
            patient_cnp: cnp.into(),
            condition: Some("gripa".into()),
            medication_id: 1,
            ..Default::default()
        };
        authorized.create_prescription(&prescription).await.unwrap();
    }

    assert_eq!(authorized.list_prescriptions().await.unwrap().len(), 2);

    let prescriptions = authorized
        .list_prescriptions_for("2900101123456")
        .await
        .unwrap();
    assert_eq!(prescriptions.len(), 1);
    assert_eq!(prescriptions[0].id, 2);
    assert_eq!(prescriptions[0].quantity, "1 box");
}

#[tokio::test]
async fn manages_users() {
    let server = TestServer::new().await;
    server.seed_user(json!({
        "rol": "Z",
        "nume": "Georgescu",
        "prenume": "Dan",
        "email": "dan@example.com",
    }));
    let authorized = logged_in(&server, "admin").await.require().unwrap();

    let user = NewUser {
        role: Role::Doctor,
        last_name: "Ionescu".into(),
        first_name: "Maria".into(),
        email: "maria@example.com".into(),
    };
    authorized.create_user(&user).await.unwrap();
    assert_eq!(server.users()[1]["rol"], "M");

    let users = authorized.list_users().await.unwrap();
    assert_eq!(users[0].role(), None);
    assert_eq!(users[1].role(), Some(Role::Doctor));
    assert_eq!(users[1].full_name(), "Ionescu Maria");
}

#[tokio::test]
async fn create_user_requires_backend_code() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "admin").await.require().unwrap();
    let requests = server.requests();

    let user = NewUser {
        role: Role::TransportTech,
        last_name: "Marin".into(),
        first_name: "Vlad".into(),
        email: "vlad@example.com".into(),
    };
    let result = authorized.create_user(&user).await;
    assert!(matches!(
        result,
        Err(Error::Decode(DecodeError::UnmappedRole(Role::TransportTech)))
    ));
    assert_eq!(server.requests(), requests);
}

#[tokio::test]
async fn backend_enforces_permissions() {
    let server = TestServer::new().await;
    let authorized = logged_in(&server, "doctor").await.require().unwrap();
    assert!(!authorized.can(Permission::ManageUsers));

    let user = NewUser {
        role: Role::Nurse,
        last_name: "Stan".into(),
        first_name: "Elena".into(),
        email: "elena@example.com".into(),
    };
    let result = authorized.create_user(&user).await;
    assert!(matches!(
        result,
        Err(Error::UnexpectedStatus {
            status: StatusCode::FORBIDDEN,
            ..
        })
    ));
    assert!(server.users().is_empty());
}
