//! 订单号 Luhn 校验
//!
//! 从最低位开始，偶数位（第 2、4、6… 位）数字乘 2，结果大于 9 时减 9，
//! 所有位求和后能被 10 整除即为合法。0 不是合法订单号。

/// 校验订单号是否满足 Luhn 算法
pub fn is_valid(number: u64) -> bool {
    if number == 0 {
        return false;
    }
    digit_sum(number, false) % 10 == 0
}

/// 计算校验位：`payload * 10 + check_digit(payload)` 必然通过校验
pub fn check_digit(payload: u64) -> u8 {
    // 追加校验位后 payload 的最低位变成偶数位，需要加倍
    let sum = digit_sum(payload, true);
    ((10 - sum % 10) % 10) as u8
}

fn digit_sum(mut number: u64, mut double: bool) -> u64 {
    let mut sum = 0;
    while number > 0 {
        let mut digit = number % 10;
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
        number /= 10;
    }
    sum
}
