use axum::{
    response::Html,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::{api, AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Dashboard page
        .route("/", get(serve_dashboard))
        .route("/api/health", get(api::health_check))
        .route("/api/config", get(api::get_config))
        // Persisted artifacts
        .route("/api/rates", get(api::get_rates))
        .route("/api/rates/csv", get(api::get_rates_csv))
        .route("/api/forecasts", get(api::get_forecasts))
        .route("/api/forecasts/:pair/csv", get(api::get_forecast_csv))
        .route("/api/metrics", get(api::get_metrics))
        .route("/api/metrics/csv", get(api::get_metrics_csv))
        // Jobs
        .route("/api/jobs", get(api::list_jobs))
        .route("/api/jobs/fetch", post(api::post_fetch_job))
        .route("/api/jobs/train", post(api::post_train_job))
        .route("/api/jobs/:id", get(api::get_job))
        .route("/api/jobs/:id/result", get(api::get_job_result))
        .layer(cors)
        .with_state(state)
}

pub async fn start_dashboard_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Dashboard server starting on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>EUR Exchange Rate Forecasts</title>
    <script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/chartjs-adapter-date-fns"></script>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
            background: #0f1419;
            color: #e7e9ea;
            min-height: 100vh;
        }
        .header {
            background: #16202a;
            padding: 1rem 2rem;
            border-bottom: 1px solid #2f3336;
            display: flex;
            justify-content: space-between;
            align-items: center;
            gap: 2rem;
            flex-wrap: wrap;
        }
        .header h1 { font-size: 1.5rem; color: #1da1f2; }
        .tabs { display: flex; gap: 0.5rem; }
        .tab {
            background: none; border: 1px solid #2f3336; color: #71767b;
            padding: 0.5rem 1rem; border-radius: 999px; cursor: pointer;
        }
        .tab.active { color: #e7e9ea; border-color: #1da1f2; }

        .container { padding: 1.5rem; max-width: 1600px; margin: 0 auto; }
        .grid { display: grid; gap: 1.5rem; }
        .grid-2 { grid-template-columns: repeat(2, 1fr); }
        @media (max-width: 1000px) { .grid-2 { grid-template-columns: 1fr; } }

        .card {
            background: #16202a;
            border-radius: 12px;
            padding: 1.5rem;
            border: 1px solid #2f3336;
            margin-bottom: 1.5rem;
        }
        .card-title {
            font-size: 0.875rem;
            color: #71767b;
            text-transform: uppercase;
            letter-spacing: 0.5px;
            margin-bottom: 0.75rem;
            display: flex;
            justify-content: space-between;
        }
        .card-title a { color: #1da1f2; text-decoration: none; text-transform: none; }
        .chart-container { height: 300px; position: relative; }
        .chart-container.large { height: 420px; }

        table { width: 100%; border-collapse: collapse; }
        th, td { padding: 0.75rem; text-align: left; border-bottom: 1px solid #2f3336; }
        th { color: #71767b; font-weight: 500; font-size: 0.75rem; text-transform: uppercase; }
        td { font-size: 0.875rem; }

        .warning {
            background: #3a2a10; border: 1px solid #ffad1f; color: #ffad1f;
            padding: 0.75rem 1rem; border-radius: 8px; margin-bottom: 1rem;
        }
        .btn {
            background: #1da1f2; color: #fff; border: none;
            padding: 0.5rem 1rem; border-radius: 8px; cursor: pointer; font-weight: 600;
        }
        .btn:disabled { background: #2f3336; cursor: not-allowed; }
        .controls { display: flex; gap: 1rem; align-items: center; flex-wrap: wrap; }
        .status-Succeeded { color: #00ba7c; }
        .status-Failed { color: #f4212e; }
        .status-Running, .status-Queued { color: #ffad1f; }
        .hidden { display: none; }
    </style>
</head>
<body>
    <div class="header">
        <h1>EUR Exchange Rate Forecasts</h1>
        <div class="tabs">
            <button class="tab active" data-view="rates">Historical Rates</button>
            <button class="tab" data-view="forecasts">Forecasts</button>
            <button class="tab" data-view="metrics">Model Metrics</button>
            <button class="tab" data-view="jobs">Jobs</button>
        </div>
    </div>

    <div class="container">
        <section id="view-rates">
            <div id="rates-warning"></div>
            <div class="card">
                <div class="card-title">
                    <span>Rates against EUR</span>
                    <a href="/api/rates/csv">Download CSV</a>
                </div>
                <div class="chart-container large"><canvas id="rates-chart"></canvas></div>
            </div>
        </section>

        <section id="view-forecasts" class="hidden">
            <div id="forecast-warnings"></div>
            <div id="forecast-panels" class="grid grid-2"></div>
        </section>

        <section id="view-metrics" class="hidden">
            <div id="metrics-warning"></div>
            <div class="card">
                <div class="card-title">
                    <span>Validation metrics</span>
                    <a href="/api/metrics/csv">Download CSV</a>
                </div>
                <table>
                    <thead><tr><th>Currency</th><th>MAE</th><th>RMSE</th><th>R²</th></tr></thead>
                    <tbody id="metrics-body"></tbody>
                </table>
            </div>
        </section>

        <section id="view-jobs" class="hidden">
            <div class="card">
                <div class="card-title"><span>Run</span></div>
                <div class="controls">
                    <button class="btn" id="btn-fetch">Fetch latest rates</button>
                    <button class="btn" id="btn-train">Train models</button>
                    <label><input type="checkbox" id="clean-slate"> Delete existing models first</label>
                    <span id="job-message"></span>
                </div>
            </div>
            <div class="card">
                <div class="card-title"><span>History</span></div>
                <table>
                    <thead><tr><th>Job</th><th>Kind</th><th>Status</th><th>Submitted</th><th>Summary</th></tr></thead>
                    <tbody id="jobs-body"></tbody>
                </table>
            </div>
        </section>
    </div>

    <script>
        const COLORS = ['#1da1f2', '#00ba7c', '#ffad1f', '#f91880', '#7856ff'];
        const charts = {};

        function warn(el, text) {
            document.getElementById(el).innerHTML = text ? `<div class="warning">${text}</div>` : '';
        }

        function timeChart(canvas, datasets) {
            if (charts[canvas]) charts[canvas].destroy();
            charts[canvas] = new Chart(document.getElementById(canvas), {
                type: 'line',
                data: { datasets },
                options: {
                    responsive: true,
                    maintainAspectRatio: false,
                    parsing: false,
                    elements: { point: { radius: 0 } },
                    scales: {
                        x: { type: 'time', ticks: { color: '#71767b' }, grid: { color: '#2f3336' } },
                        y: { ticks: { color: '#71767b' }, grid: { color: '#2f3336' } }
                    },
                    plugins: { legend: { labels: { color: '#e7e9ea' } } }
                }
            });
        }

        async function loadRates() {
            const res = await fetch('/api/rates');
            const body = await res.json();
            if (!res.ok) { warn('rates-warning', 'No historical data yet. Run a fetch job.'); return; }
            warn('rates-warning', '');
            const datasets = body.columns.map((col, i) => ({
                label: col.label,
                borderColor: COLORS[i % COLORS.length],
                borderWidth: 1.5,
                data: body.dates
                    .map((d, j) => ({ x: d, y: col.values[j] }))
                    .filter(p => p.y !== null)
            }));
            timeChart('rates-chart', datasets);
        }

        async function loadForecasts() {
            const res = await fetch('/api/forecasts');
            const body = await res.json();
            const panels = document.getElementById('forecast-panels');
            panels.innerHTML = '';
            if (!res.ok) { warn('forecast-warnings', 'No historical data yet. Run a fetch job.'); return; }
            document.getElementById('forecast-warnings').innerHTML =
                body.warnings.map(w => `<div class="warning">${w}</div>`).join('');

            body.panels.forEach((panel, i) => {
                const id = `forecast-chart-${i}`;
                panels.insertAdjacentHTML('beforeend', `
                    <div class="card">
                        <div class="card-title">
                            <span>${panel.label}</span>
                            <a href="${panel.download}">Download CSV</a>
                        </div>
                        <div class="chart-container"><canvas id="${id}"></canvas></div>
                    </div>`);
            });
            body.panels.forEach((panel, i) => {
                timeChart(`forecast-chart-${i}`, [
                    {
                        label: 'History',
                        borderColor: '#71767b',
                        borderWidth: 1.5,
                        data: panel.history.map(p => ({ x: p.date, y: p.value }))
                    },
                    {
                        label: 'Forecast',
                        borderColor: COLORS[i % COLORS.length],
                        borderDash: [6, 4],
                        borderWidth: 2,
                        data: panel.forecast.map(p => ({ x: p.date, y: p.value }))
                    }
                ]);
            });
        }

        async function loadMetrics() {
            const res = await fetch('/api/metrics');
            const body = await res.json();
            const rows = document.getElementById('metrics-body');
            if (!res.ok) {
                warn('metrics-warning', body.warning || body.error);
                rows.innerHTML = '';
                return;
            }
            warn('metrics-warning', '');
            rows.innerHTML = body.metrics.map(m => `
                <tr><td>${m.Currency}</td><td>${m.MAE.toFixed(5)}</td>
                <td>${m.RMSE.toFixed(5)}</td><td>${m.R2.toFixed(4)}</td></tr>`).join('');
        }

        async function loadJobs() {
            const res = await fetch('/api/jobs');
            const body = await res.json();
            const busy = body.active !== null;
            document.getElementById('btn-fetch').disabled = busy;
            document.getElementById('btn-train').disabled = busy;
            document.getElementById('jobs-body').innerHTML = body.jobs.map(j => `
                <tr><td>${j.id.slice(0, 8)}</td>
                <td>${j.kind}${j.clean_slate ? ' (clean slate)' : ''}</td>
                <td class="status-${j.status}">${j.status}</td>
                <td>${new Date(j.submitted_at).toLocaleString()}</td>
                <td>${j.summary || j.error || ''}</td></tr>`).join('');
            return busy;
        }

        async function submitJob(path, payload) {
            const res = await fetch(path, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(payload || {})
            });
            const body = await res.json();
            document.getElementById('job-message').textContent =
                res.ok ? `Submitted ${body.id.slice(0, 8)}` : body.error;
            pollJobs();
        }

        async function pollJobs() {
            if (await loadJobs()) {
                setTimeout(pollJobs, 2000);
            } else {
                loadAll();
            }
        }

        function loadAll() {
            loadRates();
            loadForecasts();
            loadMetrics();
            loadJobs();
        }

        document.querySelectorAll('.tab').forEach(tab => {
            tab.addEventListener('click', () => {
                document.querySelectorAll('.tab').forEach(t => t.classList.remove('active'));
                tab.classList.add('active');
                document.querySelectorAll('section').forEach(s => s.classList.add('hidden'));
                document.getElementById(`view-${tab.dataset.view}`).classList.remove('hidden');
                Object.values(charts).forEach(c => c.resize());
            });
        });
        document.getElementById('btn-fetch').addEventListener('click', () => submitJob('/api/jobs/fetch'));
        document.getElementById('btn-train').addEventListener('click', () =>
            submitJob('/api/jobs/train', { clean_slate: document.getElementById('clean-slate').checked }));

        loadAll();
        pollJobs();
    </script>
</body>
</html>
"##;
