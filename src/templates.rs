//! Fallback templates.
//!
//! When remote generation is unavailable or fails, the request is mapped to
//! one of a few canned artifacts by keyword. The rules in [`RULES`] are
//! checked in order and the first match wins, so a request such as
//! "Create a VPC with an EC2 instance" yields the networking template.
//! Requests that match nothing get [`DEFAULT_RULE`], a single EC2 instance.
//!
//! Keywords are matched against word prefixes of the lowercased request,
//! so `subnet` matches "subnets" while `rds` does not match "records".

/// A named template together with the keywords that select it.
#[derive(Debug)]
pub struct FallbackRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    template: &'static str,
}

impl FallbackRule {
    fn matches(&self, words: &[String]) -> bool {
        words
            .iter()
            .any(|w| self.keywords.iter().any(|k| w.starts_with(k)))
    }

    /// Render the template for `region`. Only the `Name` tag is set here;
    /// the policy tags are added by [`crate::tags::normalize`].
    pub fn render(&self, region: &str) -> String {
        format!("{}{}", PROVIDER, self.template).replace("{region}", region)
    }
}

/// Ordered fallback rules. Precedence is significant.
pub const RULES: &[FallbackRule] = &[
    FallbackRule {
        name: "networking",
        keywords: &["vpc", "network", "subnet"],
        template: NETWORKING,
    },
    FallbackRule {
        name: "database",
        keywords: &["rds", "database", "postgres", "mysql"],
        template: DATABASE,
    },
    FallbackRule {
        name: "storage",
        keywords: &["s3", "bucket", "storage"],
        template: STORAGE,
    },
];

/// Used when no rule in [`RULES`] matches.
pub const DEFAULT_RULE: FallbackRule = FallbackRule {
    name: "compute",
    keywords: &[],
    template: COMPUTE,
};

fn words(request: &str) -> Vec<String> {
    request
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// The rule that applies to `request`.
pub fn select_rule(request: &str) -> &'static FallbackRule {
    let words = words(request);
    RULES
        .iter()
        .find(|rule| rule.matches(&words))
        .unwrap_or(&DEFAULT_RULE)
}

/// Pick and render the fallback artifact for `request`. Never fails.
pub fn select(request: &str, region: &str) -> String {
    select_rule(request).render(region)
}

const PROVIDER: &str = r#"terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

provider "aws" {
  region = "{region}"
}
"#;

const COMPUTE: &str = r#"
resource "aws_instance" "main" {
  ami           = "ami-0c02fb55956c7d316" # Amazon Linux 2
  instance_type = "t2.micro"

  tags = {
    Name = "PromptInfra Instance"
  }
}

output "instance_ip" {
  value       = aws_instance.main.public_ip
  description = "Public IP of the instance"
}
"#;

const NETWORKING: &str = r#"
resource "aws_vpc" "main" {
  cidr_block           = "10.0.0.0/16"
  enable_dns_hostnames = true
  enable_dns_support   = true

  tags = {
    Name = "PromptInfra VPC"
  }
}

resource "aws_internet_gateway" "main" {
  vpc_id = aws_vpc.main.id

  tags = {
    Name = "PromptInfra Internet Gateway"
  }
}

resource "aws_subnet" "public" {
  vpc_id                  = aws_vpc.main.id
  cidr_block              = "10.0.1.0/24"
  map_public_ip_on_launch = true

  tags = {
    Name = "PromptInfra Public Subnet"
  }
}

output "vpc_id" {
  value = aws_vpc.main.id
}

output "public_subnet_id" {
  value = aws_subnet.public.id
}
"#;

const DATABASE: &str = r#"
resource "aws_db_instance" "main" {
  identifier_prefix           = "promptinfra-"
  engine                      = "postgres"
  instance_class              = "db.t3.micro"
  allocated_storage           = 20
  db_name                     = "app"
  username                    = "app_admin"
  manage_master_user_password = true
  skip_final_snapshot         = true

  tags = {
    Name = "PromptInfra Database"
  }
}

output "db_endpoint" {
  value = aws_db_instance.main.endpoint
}
"#;

const STORAGE: &str = r#"
resource "aws_s3_bucket" "main" {
  bucket_prefix = "promptinfra-"

  tags = {
    Name = "PromptInfra Bucket"
  }
}

output "bucket_name" {
  value = aws_s3_bucket.main.bucket
}
"#;
