//! Token 分类：是否像包名、是否为已知可执行程序、是否为安装类 flag（无状态纯函数）

/// 已知可执行程序 / shell 内建命令（首词命中即视为正常命令）
const KNOWN_BINARIES: &[&str] = &[
    // 包管理器与 Node 工具链
    "npm", "npx", "yarn", "pnpm", "pnpx", "bun", "bunx", "node", "deno", "corepack", "tsc", "tsx",
    "ts-node", "vite", "next", "nuxt", "astro", "remix", "expo", "ng", "vue", "svelte-kit",
    "webpack", "rollup", "esbuild", "parcel", "turbo", "nx", "jest", "vitest", "playwright",
    "cypress", "eslint", "prettier", "tailwindcss", "postcss", "prisma", "drizzle-kit", "supabase",
    "serve", "http-server", "nodemon", "pm2", "create-vite", "degit",
    // shell 内建与常用工具
    "cd", "ls", "pwd", "mkdir", "rmdir", "rm", "cp", "mv", "touch", "cat", "echo", "printf", "head",
    "tail", "grep", "find", "sed", "awk", "sort", "uniq", "wc", "xargs", "tee", "chmod", "chown",
    "ln", "tar", "zip", "unzip", "curl", "wget", "git", "export", "source", "env", "which", "kill",
    "clear", "sleep", "test", "true", "false", "exit", "set", "unset", "alias", "sh", "bash",
    "zsh", "sudo", "open", "code", "make", "docker", "jq", "diff", "date", "history", "python",
    "python3", "pip", "pip3", "ruby", "perl", "php",
];

/// 包管理器（以其开头的命令不做修复）
pub const PACKAGE_MANAGERS: &[&str] = &["npm", "yarn", "pnpm", "bun"];

/// 安装类 flag
pub const INSTALL_FLAGS: &[&str] = &["-D", "-S", "-g", "--save", "--save-dev", "--global"];

/// `i` 简写后可出现的 flag
pub const SHORT_INSTALL_FLAGS: &[&str] = &["-D", "-S", "-g", "--save", "--dev", "--save-dev"];

/// 可直接写成 `npm run <name>` 的脚本名
pub const SCRIPT_NAMES: &[&str] = &["dev", "build", "preview", "lint", "format"];

pub fn is_package_manager(token: &str) -> bool {
    PACKAGE_MANAGERS.contains(&token)
}

pub fn is_install_flag(token: &str) -> bool {
    INSTALL_FLAGS.contains(&token)
}

pub fn is_short_install_flag(token: &str) -> bool {
    SHORT_INSTALL_FLAGS.contains(&token)
}

pub fn is_script_name(token: &str) -> bool {
    SCRIPT_NAMES.contains(&token)
}

/// 是否为已知可执行程序（精确命中白名单或额外配置）
pub fn is_known_binary(token: &str, extra: &[String]) -> bool {
    KNOWN_BINARIES.contains(&token) || extra.iter().any(|b| b == token)
}

/// 是否像可执行程序：白名单、`.`/`/` 开头的路径执行、或含 `/` 但不以 `@` 开头（排除 scoped 包名）
pub fn is_binary_like(token: &str, extra: &[String]) -> bool {
    is_known_binary(token, extra)
        || token.starts_with('.')
        || token.starts_with('/')
        || (token.contains('/') && !token.starts_with('@'))
}

fn is_name_part(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('-')
        && !part.starts_with('.')
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// 是否像包名：`(@scope/)?name`，scope 与 name 为小写字母数字加 `.` `_` `-`
pub fn looks_like_package_name(token: &str) -> bool {
    match token.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, name)) => is_name_part(scope) && is_name_part(name),
            None => false,
        },
        None => is_name_part(token),
    }
}
