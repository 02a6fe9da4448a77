use leptos::prelude::*;

use crate::components::controls::ControlPanel;
use crate::components::force_graph::{ForceGraphCanvas, status_color};
use crate::components::uploader::GraphUploader;
use crate::components::{ControllerHandle, dispatch};
use crate::config::AppConfig;
use crate::graph::{GraphModel, HealthStatus};
use crate::simulation::{AppController, BrowserTimer, GraphSource, HttpSimulationService, RunStatus};

#[component]
fn StatsPanel(status: RwSignal<RunStatus>) -> impl IntoView {
	view! {
		<div class="stats-panel">
			<p class="day">"Day " {move || status.get().current_day}</p>
			<p class="phase">{move || status.get().phase.label()}</p>
			<ul class="counts">
				{HealthStatus::ALL
					.into_iter()
					.map(|health| {
						view! {
							<li>
								<span
									class="swatch"
									style=format!("background: {}", status_color(health))
								></span>
								{health.label()}
								": "
								{move || status.get().counts.get(health)}
							</li>
						}
					})
					.collect_view()}
			</ul>
		</div>
	}
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let config = AppConfig::from_document();
	let graph = GraphModel::shared();
	let controller = AppController::new(
		HttpSimulationService::new(&config.service_url),
		BrowserTimer,
		graph.clone(),
		config.poll_interval(),
		config.parameters,
	);

	let status = RwSignal::new(controller.status());
	let error = RwSignal::new(None::<String>);
	controller.subscribe(move |latest| status.set(latest.clone()));

	let controller: ControllerHandle = StoredValue::new_local(controller);
	on_cleanup(move || {
		controller.try_with_value(|c| c.shutdown());
	});
	dispatch(controller, error, |c| async move {
		c.load_graph(GraphSource::Default).await
	});

	view! {
		<div class="fullscreen-graph">
			<ForceGraphCanvas graph=graph config=config fullscreen=true />
			<div class="graph-overlay">
				<h1>"Contagion"</h1>
				<p class="subtitle">
					"Drag nodes to pin them. Scroll to zoom. Drag background to pan."
				</p>
				<StatsPanel status=status />
				<ControlPanel controller=controller status=status error=error />
				<GraphUploader controller=controller error=error />
				{move || error.get().map(|message| view! { <p class="error-banner">{message}</p> })}
			</div>
		</div>
	}
}
