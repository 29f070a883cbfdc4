use std::io::Write;
use std::sync::Arc;

use authflow::config::AuthConfig;
use authflow::error::AuthError;
use authflow::identity::{HttpIdentityBackend, IdentityBackend};
use authflow::inflight::InFlight;
use authflow::onboarding::{Credentials, Orchestrator, VerifyOutcome, password_strength};
use authflow::router::Router;
use authflow::session::SessionGate;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let backend: Arc<dyn IdentityBackend> = match HttpIdentityBackend::from_env() {
        Some(backend) => Arc::new(backend),
        None => {
            eprintln!("Error: AUTHFLOW_IDENTITY_URL not set");
            eprintln!("  export AUTHFLOW_IDENTITY_URL=https://id.example.com");
            eprintln!("  export AUTHFLOW_IDENTITY_KEY=pk_...");
            std::process::exit(1);
        }
    };

    eprintln!("authflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Sign-up demo. Ctrl-C to exit.\n");

    let gate = SessionGate::new();
    let in_flight = InFlight::new();
    let orchestrator = Orchestrator::new(
        backend.clone(),
        gate.clone(),
        in_flight.clone(),
        AuthConfig::default(),
    );

    // Route watcher: print changes and the imperative redirect
    let mut router = Router::new(gate.subscribe());
    tokio::spawn(async move {
        while let Some(change) = router.next_change().await {
            eprintln!("   route -> {}", change.state);
            if change.redirect_to_root {
                eprintln!("   >> navigate to main application root");
            }
        }
    });

    // No stored session in this demo: the cold-start probe resolves empty
    gate.mark_loaded();

    // Credential intake, revalidated per attempt
    loop {
        let email = prompt("email: ")?;
        let password = prompt("password: ")?;
        let consent = prompt("accept terms? [y/N]: ")?.eq_ignore_ascii_case("y");
        eprintln!("   strength: {}/5", password_strength(&password));

        let credentials = Credentials::new(email, password);
        let report = orchestrator.validate(&credentials, consent);
        if !report.is_valid() {
            if let Some(e) = report.email {
                eprintln!("   email: {}", e.message());
            }
            if let Some(e) = report.password {
                eprintln!("   password: {}", e.message());
            }
            if report.consent_missing {
                eprintln!("   {}", AuthError::ConsentRequired);
            }
            continue;
        }

        match orchestrator.submit_credentials(credentials, consent).await {
            Ok(()) => break,
            Err(e) => eprintln!("   {e}"),
        }
    }

    let email = orchestrator
        .state()
        .await
        .pending_email
        .unwrap_or_default();
    eprintln!("   code sent to {email}. Type the code, or \"resend\".");

    // Verification loop
    loop {
        let input = prompt("code: ")?;
        if input.eq_ignore_ascii_case("resend") {
            match orchestrator.resend_verification_code().await {
                Ok(()) => eprintln!("   code re-sent to {email}"),
                Err(e) => eprintln!("   {e}"),
            }
            continue;
        }
        match orchestrator.submit_verification_code(&input).await {
            Ok(VerifyOutcome::Completed) => {
                eprintln!("   verified; session active");
                break;
            }
            Ok(VerifyOutcome::StillPending) => {
                eprintln!("   additional steps required; try again");
            }
            Err(e) => eprintln!("   {e}"),
        }
    }

    // Let the route watcher drain its final change
    tokio::task::yield_now().await;
    Ok(())
}

fn prompt(label: &str) -> std::io::Result<String> {
    eprint!("{label}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
