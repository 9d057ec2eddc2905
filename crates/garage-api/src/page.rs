//! Status page rendering

use chrono::Local;
use garage_core::DoorSnapshot;
use minijinja::{context, Environment};

const INDEX_TEMPLATE: &str = "index.html";

/// Renders the single-page door dashboard
pub struct StatusPage {
    env: Environment<'static>,
}

impl StatusPage {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;
        Ok(Self { env })
    }

    /// Render the page for one snapshot
    ///
    /// `auth_required` adds a token field used by the page's buttons.
    pub fn render(&self, snapshot: &DoorSnapshot, auth_required: bool) -> Result<String, minijinja::Error> {
        let template = self.env.get_template(INDEX_TEMPLATE)?;
        template.render(context! {
            door_status => snapshot.status.as_str(),
            close_mode => snapshot.close_mode,
            auth_required => auth_required,
            rendered_at => Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }
}
