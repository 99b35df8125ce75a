use crate::bridge::{self, Drain, OutputBuffer, OutputSurface};
use crate::catalog::RenderedPage;
use crate::command::{InferenceForm, TrainingForm};
use crate::model::{CommandLine, JobEvent, JobKind, JobState};
use crate::orchestrator::LaunchedJob;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Training,
    Inference,
    Jobs,
    Models,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::Training, Tab::Inference, Tab::Jobs, Tab::Models, Tab::Help];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Training => "Training",
            Tab::Inference => "Inference",
            Tab::Jobs => "Jobs",
            Tab::Models => "Models",
            Tab::Help => "Help",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Tab {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Tab {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// One output view. Owns the consumer end of its job's channel until the job
/// reports a terminal event or the view is closed.
pub struct JobView {
    pub id: u64,
    pub kind: JobKind,
    pub command: CommandLine,
    pub output_dir: String,
    pub buffer: OutputBuffer,
    pub state: JobState,
    pub started: Instant,
    pub finished: Option<Instant>,
    /// Lines scrolled up from the tail; 0 follows new output.
    pub scroll: usize,
    events: Option<UnboundedReceiver<JobEvent>>,
}

impl JobView {
    pub fn new(job: LaunchedJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            command: job.command,
            output_dir: job.output_dir,
            buffer: OutputBuffer::default(),
            state: JobState::Idle,
            started: Instant::now(),
            finished: None,
            scroll: 0,
            events: Some(job.events),
        }
    }

    pub fn title(&self) -> String {
        format!("{} #{}", self.kind.output_title(), self.id)
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(Instant::now) - self.started
    }

    /// Pull queued output into the buffer. Returns false once the view has
    /// been closed and can be dropped.
    pub fn poll(&mut self) -> bool {
        let Some(rx) = self.events.as_mut() else {
            return self.buffer.is_open();
        };
        match bridge::drain(rx, &mut self.buffer) {
            Drain::Pending => {
                if self.state == JobState::Idle && self.buffer.started {
                    self.state = JobState::Running;
                }
                true
            }
            Drain::Finished(outcome) => {
                log::info!("job {} view received: {}", self.id, outcome.terminal_line());
                self.state = JobState::from(&outcome);
                self.finished = Some(Instant::now());
                self.events = None;
                true
            }
            Drain::Detached => {
                self.events = None;
                false
            }
        }
    }

    pub fn scroll_up(&mut self, by: usize) {
        let max = self.buffer.lines.len().saturating_sub(1);
        self.scroll = (self.scroll + by).min(max);
    }

    pub fn scroll_down(&mut self, by: usize) {
        self.scroll = self.scroll.saturating_sub(by);
    }
}

#[derive(Default)]
pub struct ModelsView {
    pub url: String,
    pub page: Option<RenderedPage>,
    pub selected: usize,
    pub loading: bool,
}

impl ModelsView {
    pub fn selected_href(&self) -> Option<&str> {
        self.page
            .as_ref()
            .and_then(|p| p.links.get(self.selected))
            .map(|l| l.href.as_str())
    }

    pub fn select_next(&mut self) {
        let n = self.page.as_ref().map_or(0, |p| p.links.len());
        if self.selected + 1 < n {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

pub struct UiState {
    pub tab: Tab,
    pub info: String,
    pub training: TrainingForm,
    pub inference: InferenceForm,
    pub training_focus: usize,
    pub inference_focus: usize,
    pub jobs: Vec<JobView>,
    pub selected_job: usize,
    pub models: ModelsView,
    pub log_path: Option<PathBuf>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: Tab::Training,
            info: String::new(),
            training: TrainingForm::default(),
            inference: InferenceForm::default(),
            training_focus: 0,
            inference_focus: 0,
            jobs: Vec::new(),
            selected_job: 0,
            models: ModelsView::default(),
            log_path: None,
        }
    }
}

impl UiState {
    pub fn add_job(&mut self, job: LaunchedJob) {
        self.info = format!("Started job {}: {}", job.id, job.command);
        self.jobs.push(JobView::new(job));
        self.selected_job = self.jobs.len() - 1;
        self.tab = Tab::Jobs;
    }

    /// Drain every view once and drop the ones the user closed.
    pub fn poll_jobs(&mut self) {
        self.jobs.retain_mut(JobView::poll);
        if self.selected_job >= self.jobs.len() {
            self.selected_job = self.jobs.len().saturating_sub(1);
        }
    }

    pub fn selected_job(&self) -> Option<&JobView> {
        self.jobs.get(self.selected_job)
    }

    pub fn selected_job_mut(&mut self) -> Option<&mut JobView> {
        self.jobs.get_mut(self.selected_job)
    }

    /// Close the selected view. A running job keeps going; its output is
    /// discarded from here on.
    pub fn close_selected_job(&mut self) {
        if let Some(view) = self.selected_job_mut() {
            view.buffer.close();
            let (id, running) = (view.id, !view.state.is_terminal());
            self.info = if running {
                format!("Closed view of job {id}; it keeps running in the background")
            } else {
                format!("Closed view of job {id}")
            };
        }
        self.poll_jobs();
    }

    pub fn running_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| !j.state.is_terminal()).count()
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobOutcome;
    use tokio::sync::mpsc;

    fn launched(id: u64) -> (mpsc::UnboundedSender<JobEvent>, LaunchedJob) {
        let (tx, rx) = mpsc::unbounded_channel();
        let job = LaunchedJob {
            id,
            kind: JobKind::Training,
            command: CommandLine {
                program: "python".into(),
                args: vec!["train.py".into()],
            },
            output_dir: "results".into(),
            events: rx,
        };
        (tx, job)
    }

    #[test]
    fn tabs_wrap_both_ways() {
        assert_eq!(Tab::Help.next(), Tab::Training);
        assert_eq!(Tab::Training.prev(), Tab::Help);
        assert_eq!(Tab::Jobs.index(), 2);
    }

    #[test]
    fn finished_job_keeps_its_output() {
        let mut state = UiState::default();
        let (tx, job) = launched(1);
        state.add_job(job);
        assert_eq!(state.tab, Tab::Jobs);
        assert_eq!(state.running_jobs(), 1);

        tx.send(JobEvent::Line { text: "epoch 1".into() }).unwrap();
        tx.send(JobEvent::Finished {
            outcome: JobOutcome::Failed { code: 3 },
        })
        .unwrap();
        state.poll_jobs();

        let view = state.selected_job().unwrap();
        assert_eq!(view.state, JobState::Failed { code: 3 });
        assert_eq!(view.buffer.lines.len(), 2);
        assert_eq!(view.title(), "Training Output #1");
        assert_eq!(state.running_jobs(), 0);
    }

    #[test]
    fn job_is_idle_until_the_child_exists() {
        let mut state = UiState::default();
        let (tx, job) = launched(1);
        state.add_job(job);
        state.poll_jobs();
        assert_eq!(state.jobs[0].state, JobState::Idle);
        assert_eq!(state.running_jobs(), 1);

        tx.send(JobEvent::Spawned { pid: Some(7) }).unwrap();
        state.poll_jobs();
        assert_eq!(state.jobs[0].state, JobState::Running);
        assert_eq!(state.jobs[0].buffer.pid, Some(7));
    }

    #[test]
    fn spawn_error_never_shows_running() {
        let mut state = UiState::default();
        let (tx, job) = launched(1);
        state.add_job(job);
        tx.send(JobEvent::Finished {
            outcome: JobOutcome::Errored {
                message: "No such file or directory".into(),
            },
        })
        .unwrap();
        state.poll_jobs();
        assert!(matches!(state.jobs[0].state, JobState::Errored { .. }));
        assert_eq!(state.running_jobs(), 0);
    }

    #[test]
    fn closing_a_view_drops_its_receiver() {
        let mut state = UiState::default();
        let (tx_a, a) = launched(1);
        let (_tx_b, b) = launched(2);
        state.add_job(a);
        state.add_job(b);

        state.selected_job = 0;
        state.close_selected_job();
        assert_eq!(state.jobs.len(), 1);
        assert_eq!(state.jobs[0].id, 2);
        assert!(tx_a.send(JobEvent::Line { text: "late".into() }).is_err());
    }

    #[test]
    fn scrolling_stays_within_output() {
        let mut state = UiState::default();
        let (tx, job) = launched(1);
        state.add_job(job);
        for i in 0..5 {
            tx.send(JobEvent::Line { text: i.to_string() }).unwrap();
        }
        state.poll_jobs();
        let view = state.selected_job_mut().unwrap();
        view.scroll_up(100);
        assert_eq!(view.scroll, 4);
        view.scroll_down(10);
        assert_eq!(view.scroll, 0);
    }
}
