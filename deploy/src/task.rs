//! Named tasks with declared parameters, validated before any handler runs.

use std::{
    collections::{BTreeMap, HashMap},
    io::Write,
};

use ethers::{abi::Token, types::U256};

use crate::{
    deploy::{ContractDeployer, DeploymentRequest, DeploymentResult},
    errors::{Error, ParameterError},
    network::NetworkRegistry,
    utils::format_tokens,
};

pub const DEPLOY_PREDICTION: &str = "deployPrediction";
const PREDICTION_CONTRACT: &str = "Prediction";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Non-negative integer up to 2^256 - 1, written in decimal.
    Uint,
}

impl ParameterKind {
    fn coerce(self, name: &str, value: &str) -> Result<Token, ParameterError> {
        let invalid = || ParameterError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
        };
        match self {
            ParameterKind::Uint => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                U256::from_dec_str(value)
                    .map(Token::Uint)
                    .map_err(|_| invalid())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterDefinition>,
}

/// Closed set of task handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHandler {
    DeployPrediction,
}

/// Coerced parameter values; optional parameters that were not given are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArguments {
    values: BTreeMap<&'static str, Token>,
}

impl TaskArguments {
    pub fn get(&self, name: &str) -> Option<&Token> {
        self.values.get(name)
    }

    fn required_uint(&self, name: &str) -> Result<U256, ParameterError> {
        match self.get(name) {
            Some(Token::Uint(value)) => Ok(*value),
            _ => Err(ParameterError::Missing(name.to_string())),
        }
    }
}

/// What a handler may touch: the network registry, the selected network name and a deployer.
pub struct TaskEnvironment<'a, D> {
    pub networks: &'a NetworkRegistry,
    pub network: &'a str,
    pub deployer: &'a D,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<&'static str, (TaskDefinition, TaskHandler)>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_tasks() -> Self {
        let mut registry = Self::new();
        registry.register(deploy_prediction_definition(), TaskHandler::DeployPrediction);
        registry
    }

    pub fn register(&mut self, definition: TaskDefinition, handler: TaskHandler) {
        log::debug!("registering task {}", definition.name);
        self.tasks.insert(definition.name, (definition, handler));
    }

    pub fn definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.values().map(|(definition, _)| definition)
    }

    /// Checks `raw` against the task's parameter schema and coerces every value.
    pub fn validate(
        &self,
        name: &str,
        raw: &HashMap<String, String>,
    ) -> Result<(TaskHandler, TaskArguments), ParameterError> {
        let (definition, handler) = self
            .tasks
            .get(name)
            .ok_or_else(|| ParameterError::UnknownTask(name.to_string()))?;

        let mut unknown: Vec<&String> = raw
            .keys()
            .filter(|key| !definition.parameters.iter().any(|p| p.name == key.as_str()))
            .collect();
        unknown.sort();
        if let Some(key) = unknown.first() {
            return Err(ParameterError::Unrecognized(key.to_string()));
        }

        let mut arguments = TaskArguments::default();
        for parameter in &definition.parameters {
            match raw.get(parameter.name) {
                Some(value) => {
                    let token = parameter.kind.coerce(parameter.name, value)?;
                    arguments.values.insert(parameter.name, token);
                }
                None if parameter.required => {
                    return Err(ParameterError::Missing(parameter.name.to_string()))
                }
                None => {}
            }
        }
        Ok((*handler, arguments))
    }

    pub async fn invoke<D: ContractDeployer, W: Write>(
        &self,
        name: &str,
        raw: &HashMap<String, String>,
        environment: &TaskEnvironment<'_, D>,
        out: &mut W,
    ) -> Result<DeploymentResult, Error> {
        let (handler, arguments) = self.validate(name, raw)?;
        log::debug!("running task {} with {:?}", name, arguments);
        match handler {
            TaskHandler::DeployPrediction => {
                deploy_prediction(&arguments, environment, out).await
            }
        }
    }
}

/// Splits `--name value` and `--name=value` pairs.
pub fn parse_raw_args(args: &[String]) -> Result<HashMap<String, String>, ParameterError> {
    let mut raw = HashMap::new();
    let mut args = args.iter().peekable();
    while let Some(arg) = args.next() {
        let Some(flag) = arg.strip_prefix("--") else {
            return Err(ParameterError::Unexpected(arg.clone()));
        };
        let (name, value) = match flag.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => match args.next_if(|next| !next.starts_with("--")) {
                Some(value) => (flag.to_string(), value.clone()),
                None => return Err(ParameterError::NoValue(flag.to_string())),
            },
        };
        if raw.contains_key(&name) {
            return Err(ParameterError::Repeated(name));
        }
        raw.insert(name, value);
    }
    Ok(raw)
}

pub fn deploy_prediction_definition() -> TaskDefinition {
    TaskDefinition {
        name: DEPLOY_PREDICTION,
        description: "Deploys a prediction contract",
        parameters: vec![
            ParameterDefinition {
                name: "stakeamount",
                description: "The amount to be staked for voting",
                required: true,
                kind: ParameterKind::Uint,
            },
            ParameterDefinition {
                name: "gameend",
                description: "The timestamp for game end.",
                required: true,
                kind: ParameterKind::Uint,
            },
        ],
    }
}

async fn deploy_prediction<D: ContractDeployer, W: Write>(
    arguments: &TaskArguments,
    environment: &TaskEnvironment<'_, D>,
    out: &mut W,
) -> Result<DeploymentResult, Error> {
    let network = environment.networks.resolve(environment.network)?;
    writeln!(
        out,
        "Deploying \"{}\" on network: \"{}\"",
        PREDICTION_CONTRACT, network.name
    )?;

    let constructor_args = vec![
        Token::Uint(arguments.required_uint("stakeamount")?),
        Token::Uint(arguments.required_uint("gameend")?),
    ];
    writeln!(
        out,
        "Contract constructor args: {}",
        format_tokens(&constructor_args)
    )?;

    let request = DeploymentRequest {
        contract_name: PREDICTION_CONTRACT.to_string(),
        constructor_args,
    };
    let result = environment.deployer.deploy(request, network).await?;
    writeln!(
        out,
        "{} deployed to: {:?}",
        PREDICTION_CONTRACT, result.contract_address
    )?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ethers::types::{Address, H256};

    use super::*;
    use crate::{
        client::testing::{Behavior, FakeChain},
        contracts::ArtifactStore,
        deploy::{DeploySettings, DeploymentExecutor, MockContractDeployer},
        errors::ConfigError,
        network::Credentials,
    };

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn networks() -> NetworkRegistry {
        NetworkRegistry::new(&Credentials::default()).unwrap()
    }

    fn expected_args() -> Vec<Token> {
        vec![
            Token::Uint(U256::from(1000u64)),
            Token::Uint(U256::from(1_700_000_000u64)),
        ]
    }

    fn result() -> DeploymentResult {
        DeploymentResult {
            transaction_hash: H256::repeat_byte(0x11),
            contract_address: Address::repeat_byte(0x22),
            confirmed: true,
        }
    }

    #[tokio::test]
    async fn forwards_constructor_args_in_order() {
        let mut deployer = MockContractDeployer::new();
        deployer
            .expect_deploy()
            .withf(|request, network| {
                request.contract_name == "Prediction"
                    && request.constructor_args == expected_args()
                    && network.name == "hardhat"
            })
            .times(1)
            .returning(|_, _| Ok(result()));
        let networks = networks();
        let environment = TaskEnvironment {
            networks: &networks,
            network: "hardhat",
            deployer: &deployer,
        };
        let mut out = Vec::new();

        let deployed = TaskRegistry::with_builtin_tasks()
            .invoke(
                DEPLOY_PREDICTION,
                &raw(&[("stakeamount", "1000"), ("gameend", "1700000000")]),
                &environment,
                &mut out,
            )
            .await
            .unwrap();

        assert_eq!(deployed, result());
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Deploying \"Prediction\" on network: \"hardhat\""));
        assert!(out.contains("Contract constructor args: [1000,1700000000]"));
        assert!(out.contains(&format!("{:?}", Address::repeat_byte(0x22))));
    }

    #[tokio::test]
    async fn negative_stake_never_reaches_the_deployer() {
        let mut deployer = MockContractDeployer::new();
        deployer.expect_deploy().times(0);
        let networks = networks();
        let environment = TaskEnvironment {
            networks: &networks,
            network: "hardhat",
            deployer: &deployer,
        };

        let err = TaskRegistry::with_builtin_tasks()
            .invoke(
                DEPLOY_PREDICTION,
                &raw(&[("stakeamount", "-1"), ("gameend", "1700000000")]),
                &environment,
                &mut Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Parameter(ParameterError::Invalid { name, .. }) if name == "stakeamount"
        ));
    }

    #[tokio::test]
    async fn unknown_network_is_reported_by_the_handler() {
        let mut deployer = MockContractDeployer::new();
        deployer.expect_deploy().never();
        let networks = networks();
        let environment = TaskEnvironment {
            networks: &networks,
            network: "mainnet",
            deployer: &deployer,
        };

        let err = TaskRegistry::with_builtin_tasks()
            .invoke(
                DEPLOY_PREDICTION,
                &raw(&[("stakeamount", "1"), ("gameend", "2")]),
                &environment,
                &mut Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::UnknownNetwork(_))));
    }

    #[test]
    fn missing_required_parameter_is_named() {
        let err = TaskRegistry::with_builtin_tasks()
            .validate(DEPLOY_PREDICTION, &raw(&[("stakeamount", "1000")]))
            .unwrap_err();
        assert_eq!(err, ParameterError::Missing("gameend".to_string()));
    }

    #[test]
    fn rejects_values_that_are_not_unsigned_integers() {
        let registry = TaskRegistry::with_builtin_tasks();
        let too_large = format!("{}0", U256::MAX);
        for value in ["", "1.5", "0x10", "+1", " 1", "ten", too_large.as_str()] {
            let err = registry
                .validate(
                    DEPLOY_PREDICTION,
                    &raw(&[("stakeamount", "1"), ("gameend", value)]),
                )
                .unwrap_err();
            assert_eq!(
                err,
                ParameterError::Invalid {
                    name: "gameend".to_string(),
                    value: value.to_string()
                }
            );
        }
    }

    #[test]
    fn accepts_zero_and_the_largest_uint() {
        let max = U256::MAX.to_string();
        let (handler, arguments) = TaskRegistry::with_builtin_tasks()
            .validate(
                DEPLOY_PREDICTION,
                &raw(&[("stakeamount", "0"), ("gameend", max.as_str())]),
            )
            .unwrap();
        assert_eq!(handler, TaskHandler::DeployPrediction);
        assert_eq!(arguments.get("stakeamount"), Some(&Token::Uint(U256::zero())));
        assert_eq!(arguments.get("gameend"), Some(&Token::Uint(U256::MAX)));
    }

    #[test]
    fn rejects_unknown_tasks_and_parameters() {
        let registry = TaskRegistry::with_builtin_tasks();
        assert_eq!(
            registry.validate("deploy", &raw(&[])).unwrap_err(),
            ParameterError::UnknownTask("deploy".to_string())
        );
        assert_eq!(
            registry
                .validate(
                    DEPLOY_PREDICTION,
                    &raw(&[("stakeamount", "1"), ("gameend", "2"), ("stakeAmount", "1")]),
                )
                .unwrap_err(),
            ParameterError::Unrecognized("stakeAmount".to_string())
        );
    }

    #[test]
    fn registered_tasks_are_listed() {
        let mut registry = TaskRegistry::with_builtin_tasks();
        registry.register(
            TaskDefinition {
                name: "deployAgain",
                description: "Deploys a prediction contract with optional parameters",
                parameters: vec![ParameterDefinition {
                    name: "stakeamount",
                    description: "The amount to be staked for voting",
                    required: false,
                    kind: ParameterKind::Uint,
                }],
            },
            TaskHandler::DeployPrediction,
        );
        let names: Vec<_> = registry.definitions().map(|d| d.name).collect();
        assert_eq!(names, ["deployAgain", DEPLOY_PREDICTION]);

        let (_, arguments) = registry.validate("deployAgain", &raw(&[])).unwrap();
        assert_eq!(arguments, TaskArguments::default());
    }

    #[test]
    fn parses_flag_value_pairs() {
        let raw = parse_raw_args(&args(&["--stakeamount", "-1", "--gameend=1700000000"])).unwrap();
        assert_eq!(raw.get("stakeamount").map(String::as_str), Some("-1"));
        assert_eq!(raw.get("gameend").map(String::as_str), Some("1700000000"));
    }

    #[test]
    fn malformed_raw_args_are_rejected() {
        assert_eq!(
            parse_raw_args(&args(&["--stakeamount", "--gameend", "1"])).unwrap_err(),
            ParameterError::NoValue("stakeamount".to_string())
        );
        assert_eq!(
            parse_raw_args(&args(&["1000"])).unwrap_err(),
            ParameterError::Unexpected("1000".to_string())
        );
        assert_eq!(
            parse_raw_args(&args(&["--gameend", "1", "--gameend", "2"])).unwrap_err(),
            ParameterError::Repeated("gameend".to_string())
        );
    }

    #[tokio::test]
    async fn deploys_end_to_end_on_a_local_network() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("contracts/Prediction.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("Prediction.json"),
            crate::contracts::tests::PREDICTION_ARTIFACT,
        )
        .unwrap();

        let key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
        let networks = NetworkRegistry::new(&Credentials::from_lookup(|variable| {
            (variable == "PRIVATE_KEY_LOCALHOST").then(|| key.to_string())
        }))
        .unwrap();
        let chain = FakeChain::new(Behavior::Succeed);
        let executor = DeploymentExecutor::new(
            ArtifactStore::new(root.path()),
            chain.clone(),
            DeploySettings {
                confirmations: 1,
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(1),
            },
        );
        let environment = TaskEnvironment {
            networks: &networks,
            network: "localhost",
            deployer: &executor,
        };
        let registry = TaskRegistry::with_builtin_tasks();
        let raw = parse_raw_args(&args(&["--stakeamount", "1000", "--gameend", "1700000000"]))
            .unwrap();

        let mut out = Vec::new();
        let first = registry
            .invoke(DEPLOY_PREDICTION, &raw, &environment, &mut out)
            .await
            .unwrap();
        let second = registry
            .invoke(DEPLOY_PREDICTION, &raw, &environment, &mut Vec::new())
            .await
            .unwrap();

        assert!(first.confirmed);
        assert_eq!(format!("{:?}", first.contract_address).len(), 42);
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("on network: \"localhost\""));
        assert!(out.contains(&format!("Prediction deployed to: {:?}", first.contract_address)));
        assert_ne!(first.contract_address, second.contract_address);
        assert_ne!(first.transaction_hash, second.transaction_hash);
        assert_eq!(chain.broadcasts().len(), 2);
    }

    #[tokio::test]
    async fn end_to_end_without_accounts_broadcasts_nothing() {
        let networks = networks();
        let chain = FakeChain::new(Behavior::Succeed);
        let executor = DeploymentExecutor::new(
            ArtifactStore::new("artifacts"),
            chain.clone(),
            DeploySettings::default(),
        );
        let environment = TaskEnvironment {
            networks: &networks,
            network: "adafel",
            deployer: &executor,
        };

        let err = TaskRegistry::with_builtin_tasks()
            .invoke(
                DEPLOY_PREDICTION,
                &raw(&[("stakeamount", "1000"), ("gameend", "1700000000")]),
                &environment,
                &mut Vec::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::NoSigner(name)) if name == "adafel"));
        assert_eq!(chain.connections(), 0);
        assert!(chain.broadcasts().is_empty());
    }
}
