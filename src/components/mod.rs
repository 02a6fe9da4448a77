use std::future::Future;

use leptos::prelude::*;
use leptos::task::spawn_local;
use log::warn;

use crate::simulation::{AppController, ControllerError};

pub mod controls;
pub mod force_graph;
pub mod uploader;

/// The controller as held by views: `Copy`, owned by the page's reactive scope.
pub type ControllerHandle = StoredValue<AppController, LocalStorage>;

/// Run a controller command off the event handler and surface its outcome in `error`.
pub fn dispatch<F, Fut>(controller: ControllerHandle, error: RwSignal<Option<String>>, command: F)
where
	F: FnOnce(AppController) -> Fut + 'static,
	Fut: Future<Output = Result<(), ControllerError>> + 'static,
{
	let Some(controller) = controller.try_get_value() else {
		return;
	};
	spawn_local(async move {
		match command(controller).await {
			Ok(()) => error.set(None),
			Err(err) => {
				warn!("{err}");
				error.set(Some(err.to_string()));
			}
		}
	});
}
