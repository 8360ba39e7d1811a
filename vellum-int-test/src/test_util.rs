use std::backtrace::Backtrace;
use std::thread;
use std::time::{Duration, Instant};
use vellum::client::DocumentClient;
use vellum::common::{Document, Value};
use vellum::errors::{ErrorKind, StoreError, StoreResult};
use vellum::fixtures::EventPublisher;
use vellum::store::memory::{MemoryDriver, MemoryDriverConfig};
use vellum::store::StoreDriver;

pub const SERVICE_USER: &str = "svc";
pub const SERVICE_PASSWORD: &str = "s3cret";

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread; `after` runs even when the test fails.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> StoreResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> StoreResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> StoreResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();
        let failure = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                let message = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_backtrace = Some(Backtrace::capture().to_string());
                format!("Panic: {}", message)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("{}", failure);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(failure);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A private embedded store, a client connected to it and a database name
/// no other test uses.
#[derive(Clone)]
pub struct TestContext {
    driver: MemoryDriver,
    client: DocumentClient,
    database: String,
}

impl TestContext {
    pub fn new(driver: MemoryDriver, client: DocumentClient, database: String) -> Self {
        Self { driver, client, database }
    }

    pub fn driver(&self) -> MemoryDriver {
        self.driver.clone()
    }

    pub fn client(&self) -> DocumentClient {
        self.client.clone()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Another client of the same store, with its own connection.
    pub fn second_client(&self) -> StoreResult<DocumentClient> {
        DocumentClient::builder()
            .config(self.client.config().clone())
            .driver(StoreDriver::new(self.driver.clone()))
            .open()
    }
}

pub fn random_database() -> String {
    format!("test_{}", uuid::Uuid::new_v4().simple())
}

pub fn create_test_context() -> StoreResult<TestContext> {
    let driver = MemoryDriver::new();
    let database = random_database();
    let client = DocumentClient::builder()
        .database(&database)
        .driver(StoreDriver::new(driver.clone()))
        .open()?;
    Ok(TestContext::new(driver, client, database))
}

pub fn create_lazy_test_context() -> StoreResult<TestContext> {
    let driver = MemoryDriver::new();
    let database = random_database();
    let client = DocumentClient::builder()
        .database(&database)
        .connect_lazily(true)
        .driver(StoreDriver::new(driver.clone()))
        .open()?;
    Ok(TestContext::new(driver, client, database))
}

/// A store whose TTL monitor runs every 100ms, for expiry scenarios.
pub fn create_expiring_test_context() -> StoreResult<TestContext> {
    let config = MemoryDriverConfig::new().ttl_monitor_interval(Some(Duration::from_millis(100)));
    let driver = MemoryDriver::with_config(config);
    let database = random_database();
    let client = DocumentClient::builder()
        .database(&database)
        .driver(StoreDriver::new(driver.clone()))
        .open()?;
    Ok(TestContext::new(driver, client, database))
}

/// A store that only accepts [SERVICE_USER], registered on the test database.
pub fn create_secured_test_context() -> StoreResult<TestContext> {
    let driver = MemoryDriver::with_config(MemoryDriverConfig::new().require_auth(true));
    let database = random_database();
    driver.add_user(&database, SERVICE_USER, SERVICE_PASSWORD)?;
    let client = DocumentClient::builder()
        .database(&database)
        .credentials(SERVICE_USER, SERVICE_PASSWORD)
        .driver(StoreDriver::new(driver.clone()))
        .open()?;
    Ok(TestContext::new(driver, client, database))
}

pub fn cleanup(ctx: TestContext) -> StoreResult<()> {
    if ctx.client.health_check(ctx.database()) {
        ctx.client.drop_database(ctx.database())?;
    }
    ctx.client.close()
}

/// Stands in for the event pipeline: every published event lands in a
/// collection keyed by its `meta.id`.
pub struct CollectionPublisher {
    client: DocumentClient,
    database: String,
    collection: String,
}

impl CollectionPublisher {
    pub fn new(client: DocumentClient, database: &str, collection: &str) -> Self {
        CollectionPublisher {
            client,
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

impl EventPublisher for CollectionPublisher {
    fn publish(&self, payload: &str) -> StoreResult<()> {
        let event = Document::parse(payload)?;
        let id = event
            .get_path("meta.id")
            .map(Value::to_plain_string)
            .ok_or_else(|| StoreError::new("Event has no meta.id", ErrorKind::BadInputError))?;

        let mut document = Document::new();
        document.put("_id", id);
        document.put("event", event);
        self.client
            .insert_raw(&self.database, &self.collection, document);
        Ok(())
    }
}
