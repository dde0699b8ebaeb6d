//! Plain-text mails sent by the workflows.

use crate::{Settings, event::Event, notify::Mail, person::Person};

fn mail(settings: &Settings, to: &str, subject: String, body: String) -> Mail {
  Mail {
    subject,
    sender: settings.mail_sender.clone(),
    recipients: vec![to.to_owned()],
    body,
  }
}

/// Double-opt-in request sent right after a new registration.
pub fn confirm_registration(
  settings: &Settings,
  person: &Person,
  event: &Event,
  confirmation_link: &str,
) -> Mail {
  let body = format!(
    "Hallo {name},\n\n\
     wir haben deine Anmeldung zu \"{event}\" erhalten.\n\
     Um sie abzuschließen, klicke bitte auf den folgenden Link:\n\n\
     {confirmation_link}\n\n\
     Erst dann bist du angemeldet.\n",
    name = person.name,
    event = event.name,
  );
  mail(
    settings,
    &person.email,
    format!("Bestätige deine Anmeldung zu \"{}\"", event.name),
    body,
  )
}

/// Acknowledgement for the pending → confirmed transition. The edit link is
/// the confirmation link itself.
pub fn registration_confirmed(
  settings: &Settings,
  person: &Person,
  event: &Event,
  edit_link: &str,
) -> Mail {
  let body = format!(
    "Hallo {name},\n\n\
     deine Anmeldung zu \"{event}\" ist jetzt bestätigt.\n\
     Über diesen Link kannst du deine Angaben jederzeit ändern:\n\n\
     {edit_link}\n",
    name = person.name,
    event = event.name,
  );
  mail(
    settings,
    &person.email,
    format!("Anmeldung bestätigt: \"{}\"", event.name),
    body,
  )
}

/// Notification to the approval mailbox about a new membership application.
pub fn membership_application(
  settings: &Settings,
  person: &Person,
  applications_link: &str,
) -> Mail {
  let body = format!(
    "{name} <{email}> hat die Mitgliedschaft beantragt.\n\n\
     Offene Anträge: {applications_link}\n",
    name = person.name,
    email = person.email,
  );
  mail(
    settings,
    &settings.approve_mail,
    "Neuer Mitgliedsantrag".to_owned(),
    body,
  )
}

pub fn edit_personal_data(settings: &Settings, email: &str, edit_link: &str) -> Mail {
  let body = format!(
    "Hallo,\n\n\
     über den folgenden Link kannst du deine Daten ändern:\n\n\
     {edit_link}\n\n\
     Der Link ist 24 Stunden gültig.\n"
  );
  mail(
    settings,
    email,
    "Mitgliedsdatenänderung".to_owned(),
    body,
  )
}

pub fn password_reset(settings: &Settings, person: &Person, reset_link: &str) -> Mail {
  let body = format!(
    "Hallo {name},\n\n\
     über den folgenden Link kannst du ein neues Passwort setzen:\n\n\
     {reset_link}\n\n\
     Der Link ist 10 Minuten gültig. Falls du kein neues Passwort angefordert \
     hast, kannst du diese Mail ignorieren.\n",
    name = person.name,
  );
  mail(
    settings,
    &format!("{} <{}>", person.name, person.email),
    "Password reset".to_owned(),
    body,
  )
}
