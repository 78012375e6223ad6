use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use enroll_core::{
    load_settings, HttpEmailNotifier, MissingNotifier, NotificationPort, RegistrationWizard,
    WizardEvent,
};
use shared::domain::PlanPackage;

/// Walks the registration wizard end to end against a live backend.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    package_name: String,
    #[arg(long)]
    package_price: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    /// Date of birth, YYYY-MM-DD.
    #[arg(long)]
    dob: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    address_line1: String,
    #[arg(long, default_value = "")]
    address_line2: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    postcode: String,
    /// Waives the payment fields when it matches the accepted code.
    #[arg(long)]
    promo_code: Option<String>,
    #[arg(long, default_value = "")]
    card_number: String,
    #[arg(long, default_value = "")]
    expiry_date: String,
    #[arg(long, default_value = "")]
    cvv: String,
    #[arg(long)]
    password: String,
}

async fn advance(wizard: &RegistrationWizard, from: &str, to: &str) -> Result<()> {
    if let Err(err) = wizard.advance_step(from, to).await {
        for field_error in wizard.field_errors().await {
            eprintln!("{}: {}", field_error.field, field_error.message);
        }
        return Err(err.into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.backend_url.clone() {
        settings.backend_url = url;
    }

    let notifier: Arc<dyn NotificationPort> = match settings.notification_endpoint.clone() {
        Some(endpoint) => Arc::new(HttpEmailNotifier::new(endpoint)?),
        None => Arc::new(MissingNotifier),
    };
    let wizard = RegistrationWizard::new_with_notifier(settings, notifier)?;
    let mut events = wizard.subscribe_events();

    wizard
        .select_package(PlanPackage::new(args.package_name, args.package_price))
        .await;

    for (field, value) in [
        ("first_name", args.first_name.as_str()),
        ("last_name", args.last_name.as_str()),
        ("dob", args.dob.as_str()),
        ("email", args.email.as_str()),
        ("phone", args.phone.as_str()),
        ("address_line1", args.address_line1.as_str()),
        ("address_line2", args.address_line2.as_str()),
        ("city", args.city.as_str()),
        ("country", args.country.as_str()),
        ("postcode", args.postcode.as_str()),
    ] {
        wizard.set_field(field, value).await;
    }

    let availability = wizard.check_email_availability(&args.email).await;
    println!("Email availability: {availability:?}");

    advance(&wizard, "personal-info", "payment-info").await?;

    if let Some(code) = &args.promo_code {
        wizard.apply_promo_code(code).await;
    } else {
        wizard.set_field("card_number", &args.card_number).await;
        wizard.set_field("expiry_date", &args.expiry_date).await;
        wizard.set_field("cvv", &args.cvv).await;
    }

    advance(&wizard, "payment-info", "password-info").await?;

    wizard.set_field("password", &args.password).await;
    wizard.set_field("confirm_password", &args.password).await;

    if let Err(err) = wizard.submit_registration().await {
        for field_error in wizard.field_errors().await {
            eprintln!("{}: {}", field_error.field, field_error.message);
        }
        return Err(err.into());
    }

    println!("Registration submitted for {}", args.email);
    while let Ok(event) = events.try_recv() {
        if let WizardEvent::NotificationWarning(warning) = event {
            println!("warning: {warning}");
        }
    }

    Ok(())
}
