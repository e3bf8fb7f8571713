//! 邀请兑换服务
//!
//! 面向表现层的入口：把原始表单转换为开通请求，并把结果转换为
//! "带错误信息重新渲染表单" 或 "成功跳转" 两者之一。

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::provisioner::AccountProvisioner;
use crate::domain::invitation_code::ServerType;
use crate::domain::provisioning::{FailureReason, ProvisioningRequest, ProvisioningResult};

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("valid email regex"));

/// 加入表单（缺失的字段视为空字符串）
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct JoinForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub code: String,
}

impl std::fmt::Debug for JoinForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

/// 表单校验规则
#[derive(Debug, Clone, Copy)]
pub struct FormRules {
    pub min_password_len: usize,
    pub max_password_len: usize,
}

impl Default for FormRules {
    fn default() -> Self {
        Self {
            min_password_len: 8,
            max_password_len: 20,
        }
    }
}

/// 兑换结果（只会是其中之一）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RedemptionOutcome {
    /// 成功，可以跳转
    Joined {
        user_id: String,
        server_type: ServerType,
    },
    /// 重新渲染表单，保留已填写的用户名和邮箱
    Rerender {
        error: String,
        #[serde(skip)]
        reason: FailureReason,
        username: String,
        email: String,
    },
}

impl RedemptionOutcome {
    pub fn is_joined(&self) -> bool {
        matches!(self, RedemptionOutcome::Joined { .. })
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            RedemptionOutcome::Rerender { reason, .. } => Some(reason),
            RedemptionOutcome::Joined { .. } => None,
        }
    }
}

/// 兑换服务
pub struct RedemptionService {
    provisioner: Arc<AccountProvisioner>,
    rules: FormRules,
}

impl RedemptionService {
    pub fn new(provisioner: Arc<AccountProvisioner>) -> Self {
        Self {
            provisioner,
            rules: FormRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: FormRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn provisioner(&self) -> &Arc<AccountProvisioner> {
        &self.provisioner
    }

    /// 校验表单并构造开通请求，失败时不产生任何副作用
    ///
    /// 只报告第一个错误，与页面上唯一的错误区域对应。
    pub fn build_request(&self, form: &JoinForm, target: ServerType) -> Result<ProvisioningRequest, FailureReason> {
        let username = form.username.trim();
        let email = form.email.trim();
        let code = form.code.trim();

        if username.is_empty() {
            return Err(invalid("Username is required."));
        }
        if email.is_empty() {
            return Err(invalid("E-mail is required."));
        }
        if form.password.is_empty() {
            return Err(invalid("Password is required."));
        }
        if code.is_empty() {
            return Err(invalid("Invitation code is required."));
        }
        if !EMAIL_REGEX.is_match(email) {
            return Err(invalid("Invalid e-mail address."));
        }

        let password_len = form.password.chars().count();
        if password_len < self.rules.min_password_len || password_len > self.rules.max_password_len {
            return Err(invalid(&format!(
                "Password must be {}–{} characters.",
                self.rules.min_password_len, self.rules.max_password_len
            )));
        }
        if form.password != form.confirm_password {
            return Err(invalid("Passwords do not match."));
        }

        Ok(ProvisioningRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: form.password.clone(),
            invite_code: code.to_string(),
            target,
        })
    }

    /// 处理一次表单提交
    pub async fn redeem(&self, form: JoinForm, target: ServerType) -> RedemptionOutcome {
        let request = match self.build_request(&form, target) {
            Ok(request) => request,
            Err(reason) => return rerender(&form, reason),
        };

        match self.provisioner.provision(request).await {
            ProvisioningResult::Success { user_id, server_type } => RedemptionOutcome::Joined {
                user_id,
                server_type,
            },
            ProvisioningResult::Failure { reason } => rerender(&form, reason),
        }
    }
}

fn invalid(message: &str) -> FailureReason {
    FailureReason::FormValidation(message.to_string())
}

fn rerender(form: &JoinForm, reason: FailureReason) -> RedemptionOutcome {
    RedemptionOutcome::Rerender {
        error: reason.message(),
        reason,
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
    }
}
