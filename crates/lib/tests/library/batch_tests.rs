use portwright_lib::notify::{AlertClass, Notifications};
use portwright_lib::pipeline::{Orchestrator, PackageDescriptor, PackageState, Stage, package_list};
use portwright_lib::platform::Toolchain;
use tempfile::TempDir;

use super::common::{RecordingExecutor, RecordingNotifier, Sent};

fn orchestrator(temp: &TempDir, executor: RecordingExecutor, sent: &Sent) -> Orchestrator<RecordingExecutor> {
  Orchestrator::new(
    executor,
    Notifications::new(vec![Box::new(RecordingNotifier(sent.clone()))], false),
    temp.path().join("logs"),
    Toolchain::new("windows-x86-msvc2019"),
  )
}

#[tokio::test]
async fn failed_fetch_isolates_package() {
  let temp = TempDir::new().unwrap();
  let sent = Sent::default();
  let executor = RecordingExecutor::failing(&[("A", Stage::Fetch)]);
  let visits = executor.visits.clone();

  let report = orchestrator(&temp, executor, &sent)
    .run(vec![PackageDescriptor::new("A"), PackageDescriptor::new("B")])
    .await
    .unwrap();

  assert!(report.has_failures());
  assert_eq!(report.state_of("A"), Some(PackageState::Failed(Stage::Fetch)));
  assert_eq!(report.state_of("B"), Some(PackageState::Done));

  let visits = visits.lock().unwrap();
  assert_eq!(visits[0], ("A".to_string(), Stage::Fetch));
  assert_eq!(visits[1], ("B".to_string(), Stage::Fetch));
  assert!(visits.iter().skip(1).all(|(name, _)| name == "B"));
  assert_eq!(visits.last().map(|(_, s)| *s), Some(Stage::Upload));

  let errors: Vec<_> = report.errors().collect();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].package, "A");
  assert_eq!(errors[0].stage, Stage::Fetch);
  assert_eq!(errors[0].log_path, temp.path().join("logs").join("log-A.txt"));
  assert!(errors[0].summary().contains("error: fetch broke"));

  let sent = sent.lock().unwrap();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].0, "Build error in A on windows-x86-msvc2019");
  assert!(sent[0].1.starts_with("A fetch FAILED\n"));
  assert!(sent[0].1.contains("error: fetch broke"));
  assert_eq!(sent[0].2, AlertClass::Error);
}

#[tokio::test]
async fn each_sweep_finishes_before_the_next() {
  let temp = TempDir::new().unwrap();
  let sent = Sent::default();
  let executor = RecordingExecutor::failing(&[]);
  let visits = executor.visits.clone();

  let report = orchestrator(&temp, executor, &sent)
    .run(vec![PackageDescriptor::new("A"), PackageDescriptor::new("B")])
    .await
    .unwrap();
  assert!(!report.has_failures());
  assert!(sent.lock().unwrap().is_empty());

  let visits = visits.lock().unwrap();
  let order: Vec<_> = visits.iter().map(|(n, s)| format!("{}:{}", n, s)).collect();
  assert_eq!(
    order,
    [
      "A:fetch", "B:fetch", "A:unpack", "A:compile", "A:install", "A:manifest", "A:qmerge", "B:unpack", "B:compile",
      "B:install", "B:manifest", "B:qmerge", "A:package", "B:package", "A:upload", "B:upload",
    ]
  );
}

#[tokio::test]
async fn runs_a_package_list_file() {
  let temp = TempDir::new().unwrap();
  let list = temp.path().join("packages.txt");
  std::fs::write(&list, "# nightly\nlibs/zlib,1.3,1\nlibs/png,,0\n").unwrap();

  let sent = Sent::default();
  let executor = RecordingExecutor::failing(&[("libs/png", Stage::Package)]);
  let report = orchestrator(&temp, executor, &sent)
    .run(package_list::load(&list).unwrap())
    .await
    .unwrap();

  assert_eq!(report.state_of("libs/zlib"), Some(PackageState::Done));
  assert_eq!(report.state_of("libs/png"), Some(PackageState::Failed(Stage::Package)));
  assert!(temp.path().join("logs").join("log-libs_png.txt").exists());
}
