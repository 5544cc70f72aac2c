#![allow(clippy::needless_for_each)]

use super::handlers::{character, home, login, logout, password, signup, version};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        version::version,
        home::home,
        signup::form,
        signup::submit,
        login::form,
        login::submit,
        logout::logout,
        password::forgotten_form,
        password::forgotten_submit,
        password::forgotten_confirmation,
        password::reset_form,
        password::reset_submit,
        password::reset_confirmation,
        character::notes_form,
        character::notes_submit,
    ),
    components(schemas(
        version::Version,
        signup::SignupForm,
        login::LoginForm,
        password::ForgottenPasswordForm,
        password::PasswordResetForm,
        character::NotesForm,
    )),
    tags(
        (name = "charasheet", description = "Service metadata"),
        (name = "pages", description = "Page state"),
        (name = "auth", description = "Signup, login and logout"),
        (name = "password", description = "Forgotten password and reset"),
        (name = "character", description = "Character sheets"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_routes() {
        let doc = openapi();
        for path in [
            "/version",
            "/",
            "/signup",
            "/login",
            "/logout",
            "/forgotten-password",
            "/password-reset/{plaintext_token}",
            "/character/{id}/notes_change/",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
