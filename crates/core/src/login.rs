//! Login, office selection and the role-filtered dashboard menu.

use crate::api::AuthApi;
use crate::forms::{CPF, OFFICE, PASSWORD};
use crate::models::{Role, SetOfficeRequest};
use crate::session::{Session, SessionStore};
use crate::validation::strip_cpf;
use crate::{ClinicError, ClinicResult};
use clinic_types::OfficeNumber;

/// Where the user lands after authenticating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A doctor without an assigned office must pick one first.
    OfficeSelection { suggested: Option<u32> },
    Dashboard,
}

pub struct LoginFlow<A, S> {
    api: A,
    store: S,
}

impl<A: AuthApi, S: SessionStore> LoginFlow<A, S> {
    pub fn new(api: A, store: S) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authenticates and persists the session.
    ///
    /// The last office chosen on this machine is carried over when the same user logs in again.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::Validation` for blank credentials (no request is made),
    /// `Unauthenticated` for rejected credentials, or a session error if it cannot be saved.
    pub async fn login(&self, cpf: &str, password: &str) -> ClinicResult<(Session, LoginOutcome)> {
        let digits = strip_cpf(cpf);
        if digits.is_empty() {
            return Err(ClinicError::invalid_field(CPF, "CPF is required"));
        }
        if password.is_empty() {
            return Err(ClinicError::invalid_field(PASSWORD, "password is required"));
        }

        let data = self.api.login(&digits, password).await?;
        let mut session = Session::new(data.token, data.user);
        if let Ok(Some(previous)) = self.store.load() {
            if previous.user.id == session.user.id {
                session.last_office = previous.last_office;
            }
        }
        self.store.save(&session)?;
        tracing::info!("user {} logged in", session.user.id);

        let outcome = if session.is_doctor() && session.user.current_office.is_none() {
            LoginOutcome::OfficeSelection {
                suggested: session.last_office,
            }
        } else {
            LoginOutcome::Dashboard
        };
        Ok((session, outcome))
    }

    /// Assigns the doctor to an office and persists the choice.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::Validation` for an invalid office number (no request is made), or
    /// any API or session error.
    pub async fn select_office(
        &self,
        session: &mut Session,
        office: &str,
    ) -> ClinicResult<LoginOutcome> {
        let office = OfficeNumber::parse(office)
            .map_err(|_| ClinicError::invalid_field(OFFICE, "please enter a valid office number"))?;

        let request = SetOfficeRequest {
            professional_id: session.user.id,
            office,
        };
        self.api.set_office(session, &request).await?;

        session.set_office(office.get());
        self.store.save(session)?;
        tracing::info!("user {} assigned to office {}", session.user.id, office);
        Ok(LoginOutcome::Dashboard)
    }

    /// # Errors
    ///
    /// Returns `ClinicError::SessionClear` if the stored session cannot be removed.
    pub fn logout(&self) -> ClinicResult<()> {
        self.store.clear()?;
        tracing::info!("session cleared");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuEntry {
    Patients,
    Professionals,
    MedicalConsultation,
    CallPanel,
}

impl MenuEntry {
    pub fn title(self) -> &'static str {
        match self {
            MenuEntry::Patients => "Pacientes",
            MenuEntry::Professionals => "Profissionais",
            MenuEntry::MedicalConsultation => "Consulta Médica",
            MenuEntry::CallPanel => "Painel de Chamadas",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MenuEntry::Patients => "Gerenciar pacientes e gerar atendimentos",
            MenuEntry::Professionals => "Gerenciar médicos e recepcionistas",
            MenuEntry::MedicalConsultation => "Gerenciar atendimentos médicos",
            MenuEntry::CallPanel => "Visualizar chamadas de pacientes",
        }
    }

    fn allowed(self, role: Role) -> bool {
        match self {
            MenuEntry::Patients | MenuEntry::CallPanel => true,
            MenuEntry::Professionals => role == Role::Administrator,
            MenuEntry::MedicalConsultation => role == Role::Doctor,
        }
    }
}

/// Dashboard entries visible to `role`, in display order.
pub fn menu_for(role: Role) -> Vec<MenuEntry> {
    [
        MenuEntry::Patients,
        MenuEntry::Professionals,
        MenuEntry::MedicalConsultation,
        MenuEntry::CallPanel,
    ]
    .into_iter()
    .filter(|entry| entry.allowed(role))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LoginData;
    use crate::models::Professional;
    use crate::session::MemorySessionStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeAuth {
        user: Professional,
        logins: AtomicUsize,
        offices: Mutex<Vec<(i64, u32)>>,
    }

    impl FakeAuth {
        fn new(role: Role, current_office: Option<u32>) -> Self {
            Self {
                user: Professional {
                    id: 42,
                    full_name: "ANA SOUZA".into(),
                    cpf: "52998224725".into(),
                    role,
                    current_office,
                },
                logins: AtomicUsize::new(0),
                offices: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn login(&self, cpf: &str, password: &str) -> ClinicResult<LoginData> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if cpf != "52998224725" || password != "secret" {
                return Err(ClinicError::Unauthenticated("invalid credentials".into()));
            }
            Ok(LoginData {
                token: "jwt".into(),
                user: self.user.clone(),
            })
        }

        async fn set_office(&self, _: &Session, request: &SetOfficeRequest) -> ClinicResult<()> {
            self.offices
                .lock()
                .expect("lock")
                .push((request.professional_id, request.office.get()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_doctor_without_office_is_sent_to_office_selection() {
        let flow = LoginFlow::new(
            FakeAuth::new(Role::Doctor, None),
            MemorySessionStore::new(),
        );
        let (session, outcome) = flow
            .login("529.982.247-25", "secret")
            .await
            .expect("login should succeed");

        assert_eq!(outcome, LoginOutcome::OfficeSelection { suggested: None });
        assert_eq!(
            flow.store().load().expect("load should succeed"),
            Some(session)
        );
    }

    #[tokio::test]
    async fn test_doctor_with_office_goes_to_dashboard() {
        let flow = LoginFlow::new(
            FakeAuth::new(Role::Doctor, Some(3)),
            MemorySessionStore::new(),
        );
        let (_, outcome) = flow
            .login("52998224725", "secret")
            .await
            .expect("login should succeed");
        assert_eq!(outcome, LoginOutcome::Dashboard);
    }

    #[tokio::test]
    async fn test_non_doctor_goes_to_dashboard() {
        for role in [Role::Receptionist, Role::Administrator] {
            let flow = LoginFlow::new(FakeAuth::new(role, None), MemorySessionStore::new());
            let (_, outcome) = flow
                .login("52998224725", "secret")
                .await
                .expect("login should succeed");
            assert_eq!(outcome, LoginOutcome::Dashboard);
        }
    }

    #[tokio::test]
    async fn test_login_suggests_last_office_for_returning_doctor() {
        let auth = FakeAuth::new(Role::Doctor, None);
        let mut previous = Session::new("old", auth.user.clone());
        previous.last_office = Some(7);
        let flow = LoginFlow::new(auth, MemorySessionStore::with_session(previous));

        let (_, outcome) = flow
            .login("52998224725", "secret")
            .await
            .expect("login should succeed");
        assert_eq!(outcome, LoginOutcome::OfficeSelection { suggested: Some(7) });
    }

    #[tokio::test]
    async fn test_rejected_credentials_leave_store_empty() {
        let flow = LoginFlow::new(
            FakeAuth::new(Role::Doctor, None),
            MemorySessionStore::new(),
        );
        let err = flow
            .login("52998224725", "wrong")
            .await
            .expect_err("login should fail");
        assert!(matches!(err, ClinicError::Unauthenticated(_)));
        assert!(flow.store().load().expect("load should succeed").is_none());
    }

    #[tokio::test]
    async fn test_blank_credentials_issue_no_request() {
        let flow = LoginFlow::new(
            FakeAuth::new(Role::Doctor, None),
            MemorySessionStore::new(),
        );
        assert!(matches!(
            flow.login("", "secret").await,
            Err(ClinicError::Validation(_))
        ));
        assert!(matches!(
            flow.login("52998224725", "").await,
            Err(ClinicError::Validation(_))
        ));
        assert_eq!(flow.api.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_select_office_updates_and_persists_session() {
        let flow = LoginFlow::new(
            FakeAuth::new(Role::Doctor, None),
            MemorySessionStore::new(),
        );
        let (mut session, _) = flow
            .login("52998224725", "secret")
            .await
            .expect("login should succeed");

        assert!(matches!(
            flow.select_office(&mut session, "0").await,
            Err(ClinicError::Validation(_))
        ));
        assert!(flow.api.offices.lock().expect("lock").is_empty());

        let outcome = flow
            .select_office(&mut session, "4")
            .await
            .expect("office selection should succeed");
        assert_eq!(outcome, LoginOutcome::Dashboard);
        assert_eq!(session.user.current_office, Some(4));
        assert_eq!(session.last_office, Some(4));
        assert_eq!(*flow.api.offices.lock().expect("lock"), vec![(42, 4)]);

        let stored = flow
            .store()
            .require()
            .expect("session should be stored");
        assert_eq!(stored.office(), Some(4));

        flow.logout().expect("logout should succeed");
        assert!(flow.store().load().expect("load should succeed").is_none());
    }

    #[test]
    fn test_menu_is_filtered_by_role() {
        assert_eq!(
            menu_for(Role::Administrator),
            vec![
                MenuEntry::Patients,
                MenuEntry::Professionals,
                MenuEntry::CallPanel
            ]
        );
        assert_eq!(
            menu_for(Role::Doctor),
            vec![
                MenuEntry::Patients,
                MenuEntry::MedicalConsultation,
                MenuEntry::CallPanel
            ]
        );
        assert_eq!(
            menu_for(Role::Receptionist),
            vec![MenuEntry::Patients, MenuEntry::CallPanel]
        );
    }
}
